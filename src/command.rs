use super::errors::EncodingError;

/// Size of the NUL-padded command field in a header
pub const COMMAND_NAME_SIZE: usize = 12;

/// The handshake commands this crate sends and recognizes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Version,
    VerAck,
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Version => "version",
            Command::VerAck => "verack",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "version" => Some(Self::Version),
            "verack" => Some(Self::VerAck),
            _ => None,
        }
    }
}

/// Pads a command name with NULs to the fixed header width
pub fn pad_command(name: &str) -> Result<[u8; COMMAND_NAME_SIZE], EncodingError> {
    let bytes = name.as_bytes();
    if bytes.len() > COMMAND_NAME_SIZE {
        return Err(EncodingError::CommandTooLong(name.to_string()));
    }

    let mut buffer = [0u8; COMMAND_NAME_SIZE];
    buffer[..bytes.len()].copy_from_slice(bytes);

    Ok(buffer)
}

/// Strips the trailing NUL padding of a command field
pub fn unpad_command(field: &[u8]) -> String {
    String::from_utf8_lossy(field)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, TestResult};
    use quickcheck_macros::quickcheck;

    impl Arbitrary for Command {
        fn arbitrary(g: &mut quickcheck::Gen) -> Self {
            match u8::arbitrary(g) % 2 {
                0 => Self::Version,
                1 => Self::VerAck,
                _ => unreachable!(),
            }
        }
    }

    #[quickcheck]
    fn test_padded_name(command: Command) -> TestResult {
        let field = pad_command(command.name()).unwrap();
        let command2 = Command::from_name(&unpad_command(&field)).unwrap();
        TestResult::from_bool(command == command2)
    }

    #[test]
    fn test_from_name() {
        assert_eq!(Command::from_name("version"), Some(Command::Version));
        assert_eq!(Command::from_name("verack"), Some(Command::VerAck));
        assert_eq!(Command::from_name("ping"), None);
        assert_eq!(Command::from_name("version\0"), None);
    }

    #[test]
    fn test_pad_command() {
        assert_eq!(
            pad_command("verack").unwrap(),
            *b"verack\0\0\0\0\0\0"
        );
        assert_eq!(pad_command("").unwrap(), [0u8; COMMAND_NAME_SIZE]);
        assert_eq!(pad_command("sendaddrv2xx").unwrap(), *b"sendaddrv2xx");
        assert!(matches!(
            pad_command("sendaddrv2xxx"),
            Err(EncodingError::CommandTooLong(_))
        ));
    }

    #[test]
    fn test_unpad_command() {
        assert_eq!(unpad_command(b"version\0\0\0\0\0"), "version");
        assert_eq!(unpad_command(b"ping\0\0\0\0\0\0\0\0"), "ping");
        assert_eq!(
            Command::from_name(&unpad_command(b"verack\0\0\0\0\0\0")),
            Some(Command::VerAck)
        );
    }
}
