//! Outbound event payloads
//!
//! Wire format: a JSON array with one object per notification. Byte fields
//! are standard base64; absent optional fields are omitted.
//!
//! ```json
//! [{"kin_version":3,"tx_hash":"...","invoice_list":"...",
//!   "stellar_event":{"result_xdr":"...","envelope_xdr":"..."}}]
//! ```

use serde::{Deserialize, Serialize};

/// Notification sent to an app's events webhook
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    /// A transaction relevant to the app
    Transaction(TransactionEvent),
}

/// Transaction notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEvent {
    /// Protocol version tag
    pub kin_version: i32,

    /// Network-scoped transaction hash
    #[serde(with = "b64")]
    pub tx_hash: Vec<u8>,

    /// Invoice attached to the transaction
    #[serde(default, skip_serializing_if = "Option::is_none", with = "b64_opt")]
    pub invoice_list: Option<Vec<u8>>,

    /// Stellar payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stellar_event: Option<StellarData>,
}

/// Raw Stellar transaction data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StellarData {
    /// Binary transaction result
    #[serde(with = "b64")]
    pub result_xdr: Vec<u8>,

    /// Binary transaction envelope
    #[serde(with = "b64")]
    pub envelope_xdr: Vec<u8>,
}

pub(crate) mod b64 {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<T: AsRef<[u8]>, S: Serializer>(bytes: T, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes.as_ref()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(s).map_err(de::Error::custom)
    }
}

pub(crate) mod b64_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Option<Vec<u8>>, s: S) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(bytes) => super::b64::serialize(bytes, s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Vec<u8>>, D::Error> {
        #[derive(Deserialize)]
        struct Wrapper(#[serde(with = "super::b64")] Vec<u8>);

        Ok(Option::<Wrapper>::deserialize(d)?.map(|Wrapper(bytes)| bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event() -> Event {
        Event::Transaction(TransactionEvent {
            kin_version: 3,
            tx_hash: vec![1, 2, 3],
            invoice_list: None,
            stellar_event: Some(StellarData {
                result_xdr: b"result".to_vec(),
                envelope_xdr: b"envelope".to_vec(),
            }),
        })
    }

    #[test]
    fn test_flat_wire_format() {
        let value = serde_json::to_value(vec![event()]).unwrap();
        assert_eq!(
            value,
            json!([{
                "kin_version": 3,
                "tx_hash": "AQID",
                "stellar_event": {
                    "result_xdr": "cmVzdWx0",
                    "envelope_xdr": "ZW52ZWxvcGU="
                }
            }])
        );
    }

    #[test]
    fn test_invoice_list_present() {
        let Event::Transaction(mut tx) = event();
        tx.invoice_list = Some(vec![0xff]);
        tx.stellar_event = None;

        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["invoice_list"], "/w==");
        assert!(value.get("stellar_event").is_none());

        let back: Event = serde_json::from_value(value).unwrap();
        assert_eq!(back, Event::Transaction(tx));
    }
}
