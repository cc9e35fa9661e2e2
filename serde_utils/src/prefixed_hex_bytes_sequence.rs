use core::fmt::{Formatter, Result as FmtResult};

use serde::{
    de::{SeqAccess, Visitor},
    ser::SerializeSeq as _,
    Deserialize, Deserializer, Serialize, Serializer,
};

#[derive(Serialize)]
#[serde(transparent)]
struct BorrowedElement<'bytes>(#[serde(with = "crate::prefixed_hex_bytes")] &'bytes [u8]);

#[derive(Deserialize)]
#[serde(transparent)]
struct OwnedElement(#[serde(with = "crate::prefixed_hex_bytes")] Vec<u8>);

pub fn serialize<S: Serializer>(
    elements: &[impl AsRef<[u8]>],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut sequence = serializer.serialize_seq(Some(elements.len()))?;

    for element in elements {
        sequence.serialize_element(&BorrowedElement(element.as_ref()))?;
    }

    sequence.end()
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Vec<u8>>, D::Error> {
    struct SequenceVisitor;

    impl<'de> Visitor<'de> for SequenceVisitor {
        type Value = Vec<Vec<u8>>;

        fn expecting(&self, formatter: &mut Formatter) -> FmtResult {
            formatter.write_str("a sequence of byte strings")
        }

        fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
            let mut elements = Vec::with_capacity(seq.size_hint().unwrap_or_default());

            while let Some(OwnedElement(bytes)) = seq.next_element()? {
                elements.push(bytes);
            }

            Ok(elements)
        }
    }

    deserializer.deserialize_seq(SequenceVisitor)
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(PartialEq, Eq, Debug, Deserialize, Serialize)]
    struct Wrapper(#[serde(with = "super")] Vec<Vec<u8>>);

    #[test]
    fn order_is_preserved() -> serde_json::Result<()> {
        let wrapper = Wrapper(vec![vec![2], vec![1], vec![]]);
        let json = json!(["0x02", "0x01", "0x"]);

        assert_eq!(serde_json::to_value(&wrapper)?, json);
        assert_eq!(serde_json::from_value::<Wrapper>(json)?, wrapper);

        Ok(())
    }
}
