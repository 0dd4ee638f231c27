//! Result codes reported by the instrument transport.
//!
//! The vendor SDK answers every call with a small integer. Zero is success;
//! anything else names a failure category. These enums give each code a
//! readable name so errors surfaced to the user say *what* went wrong rather
//! than just a number.

use std::fmt;

macro_rules! result_codes {
    (
        $(#[$meta:meta])*
        $name:ident { $($variant:ident = $code:literal => $label:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                #[doc = $label]
                $variant,
            )+
            /// A code this build does not know about
            Unknown(i32),
        }

        impl $name {
            /// Translate a raw transport code
            pub fn from_code(code: i32) -> Self {
                match code {
                    $($code => Self::$variant,)+
                    other => Self::Unknown(other),
                }
            }

            /// The raw transport code
            pub fn code(self) -> i32 {
                match self {
                    $(Self::$variant => $code,)+
                    Self::Unknown(other) => other,
                }
            }

            /// Whether the code reports success
            pub fn is_success(self) -> bool {
                self.code() == 0
            }

            /// Human-readable category name
            pub fn category(self) -> String {
                match self {
                    $(Self::$variant => $label.to_string(),)+
                    Self::Unknown(other) => format!("unknown result code {}", other),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.category())
            }
        }
    };
}

result_codes! {
    /// Outcome of opening or closing a port
    PortResult {
        Success = 0 => "success",
        Failed = 1 => "operation failed",
        PortNotFound = 2 => "port not found",
        NoDevices = 3 => "no devices found",
        ApplicationBusy = 4 => "application busy",
    }
}

result_codes! {
    /// Outcome of creating, removing or enumerating device sessions
    DeviceResult {
        Success = 0 => "success",
        WaitTimeout = 1 => "wait timeout",
        Failed = 2 => "operation failed",
        DeviceNotFound = 3 => "device not found",
        PortNotFound = 4 => "port not found",
        PortOpenError = 5 => "port open error",
        ApplicationBusy = 6 => "application busy",
    }
}

result_codes! {
    /// Outcome of a register read or write
    RegisterResult {
        Success = 0 => "success",
        ReadError = 1 => "read error",
        Failed = 2 => "operation failed",
        Busy = 3 => "module busy",
        Nacked = 4 => "message not acknowledged",
        CrcError = 5 => "CRC error",
        Timeout = 6 => "timeout",
        ComError = 7 => "communication error",
        TypeError = 8 => "register type error",
        IndexError = 9 => "register index error",
        PortClosed = 10 => "port closed",
        RegisterNotFound = 11 => "register not found",
        DeviceNotFound = 12 => "device not found",
        PortNotFound = 13 => "port not found",
        PortOpenError = 14 => "port open error",
        ApplicationBusy = 15 => "application busy",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_codes_round_trip() {
        assert_eq!(RegisterResult::from_code(6), RegisterResult::Timeout);
        assert_eq!(RegisterResult::Timeout.code(), 6);
        assert_eq!(DeviceResult::from_code(3), DeviceResult::DeviceNotFound);
        assert!(PortResult::from_code(0).is_success());
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let result = RegisterResult::from_code(42);
        assert_eq!(result, RegisterResult::Unknown(42));
        assert_eq!(result.code(), 42);
        assert!(!result.is_success());
        assert_eq!(result.to_string(), "unknown result code 42");
    }

    #[test]
    fn test_display_names_category() {
        assert_eq!(RegisterResult::CrcError.to_string(), "CRC error");
        assert_eq!(PortResult::PortNotFound.to_string(), "port not found");
    }
}
