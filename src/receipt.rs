//! Receipt data returned to polling clients.
//!
//! A [`Receipt`] is the extractor's JSON object after key repair, kept
//! exactly as the model produced it: numbers stay numbers (integers stay
//! integers), strings stay strings, and absent fields stay absent. The
//! accessors read the Portuguese keys the extraction prompt asks for
//! (`categoria`, `chave_acesso`, `produtos`) without requiring them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A normalised Brazilian fiscal receipt (cupom fiscal / NFC-e).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(Map<String, Value>);

impl Receipt {
    /// Field value by key, as returned by the extractor.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Purchase category, when the extractor gave it as a string.
    pub fn categoria(&self) -> Option<&str> {
        self.get("categoria").and_then(Value::as_str)
    }

    /// 44-digit access key; `""` when the receipt was unreadable.
    pub fn chave_acesso(&self) -> Option<&str> {
        self.get("chave_acesso").and_then(Value::as_str)
    }

    /// Line items in receipt order; empty when absent or not a list.
    pub fn produtos(&self) -> &[Value] {
        self.get("produtos")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Receipt {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn receipt(v: Value) -> Receipt {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn accessors_read_prompt_keys() {
        let r = receipt(json!({
            "categoria": "supermercado",
            "CNPJ": "06.057.223/0001-71",
            "chave_acesso": "35240306057223000171650010000123451000123456",
            "produtos": [
                {"codigo": 7891000100103u64, "produto": "LEITE", "quantidade": 2},
                {"codigo": null, "produto": "PAO", "preco_total": "15,00"}
            ]
        }));
        assert_eq!(r.categoria(), Some("supermercado"));
        assert_eq!(
            r.chave_acesso(),
            Some("35240306057223000171650010000123451000123456")
        );
        assert_eq!(r.produtos().len(), 2);
        assert_eq!(r.get("CNPJ"), Some(&json!("06.057.223/0001-71")));
    }

    #[test]
    fn accessors_tolerate_missing_or_odd_fields() {
        let r = receipt(json!({ "categoria": ["supermercado", "farmácia"], "produtos": "none" }));
        assert_eq!(r.categoria(), None);
        assert_eq!(r.chave_acesso(), None);
        assert!(r.produtos().is_empty());
    }

    #[test]
    fn serialises_exactly_as_received() {
        let v = json!({
            "categoria": "farmácia",
            "total_compra": 12,
            "forma_pagamento": "PIX",
            "produtos": [{"produto": "A"}]
        });
        let back = serde_json::to_value(receipt(v.clone())).unwrap();
        assert_eq!(back, v);
        assert_eq!(
            serde_json::to_string(&back["total_compra"]).unwrap(),
            "12"
        );
        assert!(back.get("CNPJ").is_none());
    }

    #[test]
    fn non_object_is_not_a_receipt() {
        assert!(serde_json::from_value::<Receipt>(json!([1, 2])).is_err());
    }
}
