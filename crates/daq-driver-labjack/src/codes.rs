//! LJM library error codes.
//!
//! Every LJM call returns an integer status. Zero is success, 200–399 are
//! warnings (the call still did its work), 1200–1216 are Modbus exceptions
//! reported by the device, and 1220–1399 are errors raised inside the
//! library itself.
//!
//! [`ErrorCode`] wraps the raw integer and carries the full table as
//! associated constants, so call sites read like the vendor documentation:
//!
//! ```
//! use daq_driver_labjack::ErrorCode;
//!
//! let code = ErrorCode::from(1303);
//! assert_eq!(code, ErrorCode::STREAM_NOT_RUNNING);
//! assert_eq!(code.name(), Some("STREAM_NOT_RUNNING"));
//! assert!(code.is_library_error());
//! ```

use std::fmt;
use std::ops::RangeInclusive;

/// A raw LJM status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ErrorCode(pub i32);

macro_rules! error_codes {
    ($($name:ident = $value:literal;)*) => {
        #[allow(missing_docs)]
        impl ErrorCode {
            $(pub const $name: ErrorCode = ErrorCode($value);)*

            /// Symbolic name of this code, if it is in the table.
            pub fn name(self) -> Option<&'static str> {
                match self.0 {
                    $($value => Some(stringify!($name)),)*
                    _ => None,
                }
            }
        }
    };
}

error_codes! {
    NOERROR = 0;

    FRAMES_OMITTED_DUE_TO_PACKET_SIZE = 201;
    LOG_FAILURE = 202;

    MBE1_ILLEGAL_FUNCTION = 1201;
    MBE2_ILLEGAL_DATA_ADDRESS = 1202;
    MBE3_ILLEGAL_DATA_VALUE = 1203;
    MBE4_SLAVE_DEVICE_FAILURE = 1204;
    MBE5_ACKNOWLEDGE = 1205;
    MBE6_SLAVE_DEVICE_BUSY = 1206;
    MBE8_MEMORY_PARITY_ERROR = 1208;
    MBE10_GATEWAY_PATH_UNAVAILABLE = 1210;
    MBE11_GATEWAY_TARGET_NO_RESPONSE = 1211;

    UNKNOWN_ERROR = 1221;
    INVALID_DEVICE_TYPE = 1222;
    INVALID_HANDLE = 1223;
    DEVICE_NOT_OPEN = 1224;
    STREAM_NOT_INITIALIZED = 1225;
    DEVICE_NOT_FOUND = 1227;
    DEVICE_ALREADY_OPEN = 1229;
    COULD_NOT_CLAIM_DEVICE = 1230;
    CANNOT_CONNECT = 1231;
    SOCKET_LEVEL_ERROR = 1233;
    CANNOT_OPEN_DEVICE = 1236;
    CANNOT_DISCONNECT = 1237;
    WINSOCK_FAILURE = 1238;
    DEVICE_RECONNECT_FAILED = 1239;

    INVALID_ADDRESS = 1250;
    INVALID_CONNECTION_TYPE = 1251;
    INVALID_DIRECTION = 1252;
    INVALID_FUNCTION = 1253;
    INVALID_NUM_REGISTERS = 1254;
    INVALID_PARAMETER = 1255;
    INVALID_PROTOCOL_ID = 1256;
    INVALID_TRANSACTION_ID = 1257;
    INVALID_VALUE_TYPE = 1259;
    MEMORY_ALLOCATION_FAILURE = 1260;
    NO_COMMAND_BYTES_SENT = 1261;
    INCORRECT_NUM_COMMAND_BYTES_SENT = 1262;
    NO_RESPONSE_BYTES_RECEIVED = 1263;
    INCORRECT_NUM_RESPONSE_BYTES_RECEIVED = 1264;
    MIXED_FORMAT_IP_ADDRESS = 1265;
    UNKNOWN_IDENTIFIER = 1266;
    NOT_IMPLEMENTED = 1267;
    INVALID_INDEX = 1268;
    INVALID_LENGTH = 1269;
    ERROR_BIT_SET = 1270;
    INVALID_MAXBYTESPERMBFB = 1271;
    NULL_POINTER = 1272;
    NULL_OBJ = 1273;
    RESERVED_NAME = 1274;
    UNPARSABLE_DEVICE_TYPE = 1275;
    UNPARSABLE_CONNECTION_TYPE = 1276;
    UNPARSABLE_IDENTIFIER = 1277;
    PACKET_SIZE_TOO_LARGE = 1278;
    TRANSACTION_ID_ERR = 1279;
    PROTOCOL_ID_ERR = 1280;
    LENGTH_ERR = 1281;
    UNIT_ID_ERR = 1282;
    FUNCTION_ERR = 1283;
    STARTING_REG_ERR = 1284;
    NUM_REGS_ERR = 1285;
    NUM_BYTES_ERR = 1286;
    INVALID_NUM_VALUES = 1291;
    MODBUS_CONSTANTS_FILE_NOT_FOUND = 1292;
    INVALID_MODBUS_CONSTANTS_FILE = 1293;
    INVALID_NAME = 1294;
    OVERSPECIFIED_PORT = 1296;
    INTENT_NOT_READY = 1297;
    ATTR_LOAD_COMM_FAILURE = 1298;
    INVALID_CONFIG_NAME = 1299;
    ERROR_RETRIEVAL_FAILURE = 1300;
    LJM_BUFFER_FULL = 1301;
    COULD_NOT_START_STREAM = 1302;
    STREAM_NOT_RUNNING = 1303;
    UNABLE_TO_STOP_STREAM = 1304;
}

impl ErrorCode {
    /// Warning codes: the call completed but something was off.
    pub const WARNINGS: RangeInclusive<i32> = 200..=399;
    /// Modbus exception codes reported by the device.
    pub const MODBUS_ERRORS: RangeInclusive<i32> = 1200..=1216;
    /// Errors raised inside LJM.
    pub const LIBRARY_ERRORS: RangeInclusive<i32> = 1220..=1399;

    /// The raw integer value.
    pub fn code(self) -> i32 {
        self.0
    }

    /// Whether this is `NOERROR`.
    pub fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Whether this code is in the warning range.
    pub fn is_warning(self) -> bool {
        Self::WARNINGS.contains(&self.0)
    }

    /// Whether this code is a Modbus exception from the device.
    pub fn is_modbus_error(self) -> bool {
        Self::MODBUS_ERRORS.contains(&self.0)
    }

    /// Whether this code was raised by the library.
    pub fn is_library_error(self) -> bool {
        Self::LIBRARY_ERRORS.contains(&self.0)
    }
}

impl From<i32> for ErrorCode {
    fn from(code: i32) -> Self {
        Self(code)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "LJME_{} ({})", name, self.0),
            None => write!(f, "LJM error {}", self.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_table() {
        assert_eq!(ErrorCode::NOERROR.name(), Some("NOERROR"));
        assert_eq!(ErrorCode(1227).name(), Some("DEVICE_NOT_FOUND"));
        assert_eq!(ErrorCode(1301).name(), Some("LJM_BUFFER_FULL"));
        assert_eq!(ErrorCode(1304).name(), Some("UNABLE_TO_STOP_STREAM"));
        assert_eq!(ErrorCode(1304), ErrorCode::UNABLE_TO_STOP_STREAM);
        assert_eq!(ErrorCode(1234).name(), None);
    }

    #[test]
    fn test_ranges() {
        assert!(ErrorCode::NOERROR.is_success());
        assert!(ErrorCode::FRAMES_OMITTED_DUE_TO_PACKET_SIZE.is_warning());
        assert!(ErrorCode::MBE6_SLAVE_DEVICE_BUSY.is_modbus_error());
        assert!(ErrorCode::INVALID_NAME.is_library_error());
        assert!(!ErrorCode::INVALID_NAME.is_warning());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            ErrorCode::STREAM_NOT_RUNNING.to_string(),
            "LJME_STREAM_NOT_RUNNING (1303)"
        );
        assert_eq!(ErrorCode(4242).to_string(), "LJM error 4242");
    }
}
