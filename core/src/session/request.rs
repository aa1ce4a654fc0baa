// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Confirmation requests and results

use num_enum::TryFromPrimitive;
use strum::{Display, EnumIter, EnumString};
use zeroize::Zeroizing;

bitflags::bitflags! {
    /// Accessibility options for prompt rendering
    pub struct UiOptions: u32 {
        /// Render with inverted colours
        const ACCESSIBILITY_INVERTED = 1 << 0;

        /// Render with magnified text
        const ACCESSIBILITY_MAGNIFIED = 1 << 1;
    }
}

/// A request for user confirmation, immutable once submitted
#[derive(Clone, PartialEq, Debug)]
pub struct ConfirmationRequest {
    prompt_text: Vec<u8>,
    extra_data: Vec<u8>,
    locale: String,
    ui_options: UiOptions,
}

impl ConfirmationRequest {
    /// Create a new confirmation request
    pub fn new(
        prompt_text: impl Into<Vec<u8>>,
        extra_data: impl Into<Vec<u8>>,
        locale: impl Into<String>,
        ui_options: UiOptions,
    ) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            extra_data: extra_data.into(),
            locale: locale.into(),
            ui_options,
        }
    }

    pub fn prompt_text(&self) -> &[u8] {
        &self.prompt_text
    }

    pub fn extra_data(&self) -> &[u8] {
        &self.extra_data
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn ui_options(&self) -> UiOptions {
        self.ui_options
    }
}

/// Response codes delivered with a [ConfirmationResult]
#[derive(
    Copy, Clone, PartialEq, Eq, Debug, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(u32)]
pub enum ResponseCode {
    /// User confirmed the prompt
    Ok = 0,
    /// User cancelled the prompt
    Canceled = 1,
    /// Prompt was aborted by the caller or the secure environment
    Aborted = 2,
    /// Another prompt is in progress
    OperationPending = 3,
    /// Input event rejected outside the interactive phase
    Ignored = 4,
    /// Channel or display failure
    SystemError = 5,
    Unimplemented = 6,
    Unexpected = 7,
    /// Prompt could not be rendered
    UIError = 0x10000,
    UIErrorMissingGlyph = 0x10001,
    UIErrorMessageTooLong = 0x10002,
    UIErrorMalformedUTF8Encoding = 0x10003,
}

impl ResponseCode {
    /// Check whether the code belongs to the UI error family
    pub fn is_ui_error(&self) -> bool {
        (*self as u32) & 0xffff_0000 == ResponseCode::UIError as u32
    }
}

/// Outcome of a confirmation session, delivered exactly once per session
#[derive(Clone, PartialEq, Debug)]
pub struct ConfirmationResult {
    /// Outcome of the prompt
    pub code: ResponseCode,
    /// Formatted confirmation message, empty unless `code` is [ResponseCode::Ok]
    pub message: Vec<u8>,
    /// Signature over `message` produced in the secure environment
    pub signature: Vec<u8>,
}

impl ConfirmationResult {
    /// Successful confirmation with message and signature
    pub fn confirmed(message: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            code: ResponseCode::Ok,
            message,
            signature,
        }
    }

    /// Terminal outcome without a confirmation token
    pub fn from_code(code: ResponseCode) -> Self {
        Self {
            code,
            message: vec![],
            signature: vec![],
        }
    }
}

/// Opaque secure input token (hardware auth token), cleared on drop
#[derive(Clone, PartialEq)]
pub struct InputToken(Zeroizing<Vec<u8>>);

impl InputToken {
    pub fn new(token: impl Into<Vec<u8>>) -> Self {
        Self(Zeroizing::new(token.into()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl core::fmt::Debug for InputToken {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "InputToken({} bytes)", self.0.len())
    }
}
