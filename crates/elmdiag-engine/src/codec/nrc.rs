//! Negative response codes and how the scanner reacts to them

use std::fmt;

/// What a probe does after a negative response
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NrcAction {
    /// Wait, then repeat the same request exactly once
    RetryOnce,
    /// The module will not answer this service; stop querying it
    AbandonModule,
    /// Try the next status mask
    NextMask,
}

macro_rules! negative_response_codes {
    ($($name:ident = $value:literal => $text:literal,)*) => {
        /// ISO 14229-1 negative response codes
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NegativeResponseCode {
            $($name,)*
            /// Reserved or manufacturer specific
            Unknown(u8),
        }

        impl From<u8> for NegativeResponseCode {
            fn from(value: u8) -> Self {
                match value {
                    $($value => Self::$name,)*
                    other => Self::Unknown(other),
                }
            }
        }

        impl From<NegativeResponseCode> for u8 {
            fn from(nrc: NegativeResponseCode) -> u8 {
                match nrc {
                    $(NegativeResponseCode::$name => $value,)*
                    NegativeResponseCode::Unknown(value) => value,
                }
            }
        }

        impl NegativeResponseCode {
            /// Human readable name
            pub fn description(&self) -> &'static str {
                match self {
                    $(Self::$name => $text,)*
                    Self::Unknown(_) => "Unknown Negative Response",
                }
            }
        }
    };
}

negative_response_codes! {
    GeneralReject = 0x10 => "General Reject",
    ServiceNotSupported = 0x11 => "Service Not Supported",
    SubFunctionNotSupported = 0x12 => "Sub-Function Not Supported",
    IncorrectMessageLength = 0x13 => "Incorrect Message Length Or Invalid Format",
    ResponseTooLong = 0x14 => "Response Too Long",
    BusyRepeatRequest = 0x21 => "Busy Repeat Request",
    ConditionsNotCorrect = 0x22 => "Conditions Not Correct",
    RequestSequenceError = 0x24 => "Request Sequence Error",
    NoResponseFromSubnet = 0x25 => "No Response From Subnet Component",
    FailurePreventsExecution = 0x26 => "Failure Prevents Execution Of Requested Action",
    RequestOutOfRange = 0x31 => "Request Out Of Range",
    SecurityAccessDenied = 0x33 => "Security Access Denied",
    ResponsePending = 0x78 => "Response Pending",
    SubFunctionNotSupportedInActiveSession = 0x7E => "Sub-Function Not Supported In Active Session",
    ServiceNotSupportedInActiveSession = 0x7F => "Service Not Supported In Active Session",
    VoltageTooHigh = 0x92 => "Voltage Too High",
    VoltageTooLow = 0x93 => "Voltage Too Low",
}

impl NegativeResponseCode {
    /// Scanner reaction to this code.
    ///
    /// Response pending earns one retry. Codes saying the service or
    /// sub-function is unavailable end the module's UDS probe without
    /// retries. Anything else moves on to the next status mask.
    pub fn action(&self) -> NrcAction {
        match self {
            Self::ResponsePending => NrcAction::RetryOnce,
            Self::ServiceNotSupported
            | Self::SubFunctionNotSupported
            | Self::SubFunctionNotSupportedInActiveSession
            | Self::ServiceNotSupportedInActiveSession => NrcAction::AbandonModule,
            _ => NrcAction::NextMask,
        }
    }
}

impl fmt::Display for NegativeResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), u8::from(*self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0x78, NrcAction::RetryOnce)]
    #[case(0x11, NrcAction::AbandonModule)]
    #[case(0x12, NrcAction::AbandonModule)]
    #[case(0x7E, NrcAction::AbandonModule)]
    #[case(0x7F, NrcAction::AbandonModule)]
    #[case(0x22, NrcAction::NextMask)]
    #[case(0x31, NrcAction::NextMask)]
    #[case(0xF0, NrcAction::NextMask)]
    fn test_nrc_actions(#[case] byte: u8, #[case] action: NrcAction) {
        assert_eq!(NegativeResponseCode::from(byte).action(), action);
    }

    #[test]
    fn test_byte_conversion_preserves_unknown() {
        assert_eq!(u8::from(NegativeResponseCode::from(0x78)), 0x78);
        assert_eq!(NegativeResponseCode::from(0xF3), NegativeResponseCode::Unknown(0xF3));
        assert_eq!(u8::from(NegativeResponseCode::Unknown(0xF3)), 0xF3);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            NegativeResponseCode::ResponsePending.to_string(),
            "Response Pending (0x78)"
        );
    }
}
