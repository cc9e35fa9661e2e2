//! Engine API `QUANTITY`: `0x` followed by hexadecimal digits without leading zeros.
//!
//! See <https://github.com/ethereum/execution-apis/blob/main/src/engine/common.md#encoding>.

use core::fmt::{Formatter, Result as FmtResult};

use serde::{
    de::{Error, Visitor},
    Deserializer, Serializer,
};

use crate::shared;

pub fn serialize<S: Serializer>(quantity: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    if serializer.is_human_readable() {
        serializer.collect_str(&format_args!("{quantity:#x}"))
    } else {
        serializer.serialize_u64(*quantity)
    }
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    struct QuantityVisitor;

    impl Visitor<'_> for QuantityVisitor {
        type Value = u64;

        fn expecting(&self, formatter: &mut Formatter) -> FmtResult {
            formatter.write_str("a quantity encoded as 0x-prefixed hexadecimal or an integer")
        }

        fn visit_u64<E>(self, quantity: u64) -> Result<Self::Value, E> {
            Ok(quantity)
        }

        fn visit_str<E: Error>(self, string: &str) -> Result<Self::Value, E> {
            match shared::strip_hex_prefix(string)? {
                "" => Err(E::custom("quantity has no hexadecimal digits")),
                "0" => Ok(0),
                digits if digits.starts_with('0') => {
                    Err(E::custom("quantity has leading zeros"))
                }
                digits => u64::from_str_radix(digits, 16).map_err(E::custom),
            }
        }
    }

    if deserializer.is_human_readable() {
        deserializer.deserialize_str(QuantityVisitor)
    } else {
        deserializer.deserialize_u64(QuantityVisitor)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Result};
    use test_case::test_case;

    #[derive(PartialEq, Eq, Debug, Deserialize, Serialize)]
    struct Header {
        #[serde(with = "super")]
        number: u64,
    }

    #[test_case(0, "0x0")]
    #[test_case(0x400, "0x400")]
    #[test_case(1_700_000_000, "0x6553f100")]
    #[test_case(u64::MAX, "0xffffffffffffffff")]
    fn quantity_is_minimal_hex(number: u64, hex: &str) -> Result<()> {
        let json = json!({ "number": hex });

        assert_eq!(serde_json::to_value(Header { number })?, json);
        assert_eq!(serde_json::from_value::<Header>(json)?, Header { number });

        Ok(())
    }

    #[test_case(json!(""); "empty string")]
    #[test_case(json!("400"); "missing prefix")]
    #[test_case(json!("0x"); "no digits")]
    #[test_case(json!("0x0400"); "leading zero")]
    #[test_case(json!("0xg"); "non-hex digit")]
    #[test_case(json!("0x10000000000000000"); "overflow")]
    #[test_case(json!(1024); "json number")]
    fn malformed_quantity_is_rejected(number: serde_json::Value) {
        serde_json::from_value::<Header>(json!({ "number": number }))
            .expect_err("quantity should be rejected");
    }
}
