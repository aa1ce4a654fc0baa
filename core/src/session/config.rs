// Copyright (c) 2022-2023 The MobileCoin Foundation

use std::time::Duration;

use crate::display::Region;

/// [ConfirmationSession][super::ConfirmationSession] configuration
#[derive(Clone, PartialEq, Debug)]
pub struct SessionConfig {
    /// Display width in pixels
    pub width: u32,

    /// Display height in pixels
    pub height: u32,

    /// Framebuffer bytes per pixel
    pub bytes_per_pixel: u32,

    /// Supervisory bound on `abort`, `None` waits indefinitely
    pub abort_timeout: Option<Duration>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            width: 1080,
            height: 1920,
            bytes_per_pixel: 4,
            abort_timeout: Some(Duration::from_secs(10)),
        }
    }
}

impl SessionConfig {
    /// Full-screen region used for the prompt layer
    pub fn region(&self) -> Region {
        Region {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        }
    }

    /// Framebuffer length required for the configured resolution, `None`
    /// if the geometry overflows
    pub fn framebuffer_len(&self) -> Option<u64> {
        (self.width as u64)
            .checked_mul(self.height as u64)?
            .checked_mul(self.bytes_per_pixel as u64)
    }
}
