use core::fmt::{Formatter, Result as FmtResult};

use serde::{
    de::{Error, Visitor},
    Deserializer, Serializer,
};

use crate::shared;

pub fn serialize<S: Serializer>(bytes: impl AsRef<[u8]>, serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.serialize_str(const_hex::encode_prefixed(bytes).as_str())
    } else {
        serializer.serialize_bytes(bytes.as_ref())
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
    struct BytesVisitor {
        human_readable: bool,
    }

    impl Visitor<'_> for BytesVisitor {
        type Value = Vec<u8>;

        fn expecting(&self, formatter: &mut Formatter) -> FmtResult {
            formatter.write_str(shared::expecting_prefixed_hex_or_bytes(self.human_readable))
        }

        fn visit_byte_buf<E>(self, bytes: Vec<u8>) -> Result<Self::Value, E> {
            Ok(bytes)
        }

        fn visit_bytes<E>(self, bytes: &[u8]) -> Result<Self::Value, E> {
            Ok(bytes.to_owned())
        }

        fn visit_str<E: Error>(self, string: &str) -> Result<Self::Value, E> {
            shared::decode_prefixed(string)
        }
    }

    let human_readable = deserializer.is_human_readable();
    let visitor = BytesVisitor { human_readable };

    if human_readable {
        deserializer.deserialize_str(visitor)
    } else {
        deserializer.deserialize_byte_buf(visitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(PartialEq, Eq, Debug, Deserialize, Serialize)]
    struct Wrapper(#[serde(with = "super")] Vec<u8>);

    #[test]
    fn json_uses_prefixed_hex() -> serde_json::Result<()> {
        let wrapper = Wrapper(vec![0xde, 0xad, 0xbe, 0xef]);

        assert_eq!(serde_json::to_value(&wrapper)?, json!("0xdeadbeef"));
        assert_eq!(serde_json::from_value::<Wrapper>(json!("0xdeadbeef"))?, wrapper);
        assert_eq!(serde_json::from_value::<Wrapper>(json!("0x"))?, Wrapper(vec![]));

        Ok(())
    }

    #[test]
    fn json_without_prefix_is_rejected() {
        serde_json::from_value::<Wrapper>(json!("deadbeef"))
            .expect_err("unprefixed hex should be rejected");
    }
}
