use super::errors::EncodingError;

pub type EncodeResult<T> = std::result::Result<T, EncodingError>;

pub trait Encodable {
    fn to_bytes(&self) -> EncodeResult<Vec<u8>>;
}

pub trait Decodable {
    fn from_bytes(bytes: &[u8]) -> EncodeResult<Self>
    where
        Self: Sized;
}

pub fn encode<T: Encodable>(object: &T) -> EncodeResult<Vec<u8>> {
    object.to_bytes()
}

pub fn decode<T: Decodable>(bytes: &[u8]) -> EncodeResult<T> {
    T::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StartHeight {
        value: i32,
    }

    impl Encodable for StartHeight {
        fn to_bytes(&self) -> EncodeResult<Vec<u8>> {
            Ok(self.value.to_le_bytes().to_vec())
        }
    }

    impl Decodable for StartHeight {
        fn from_bytes(bytes: &[u8]) -> EncodeResult<Self> {
            let value = i32::from_le_bytes(bytes.try_into()?);

            Ok(Self { value })
        }
    }

    #[test]
    fn test_encode_decode() {
        let height = StartHeight { value: -256 };
        let bytes = encode(&height).unwrap();
        let decoded = decode::<StartHeight>(&bytes).unwrap();

        assert_eq!(decoded.value, height.value);
    }

    #[test]
    fn test_decode_short_input() {
        assert!(matches!(
            decode::<StartHeight>(&[0x01, 0x02]),
            Err(EncodingError::DecodeError(_))
        ));
    }
}
