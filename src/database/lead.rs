use crate::database::DatastoreError;
use crate::database::Record;
use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde_json::Value;
use std::fmt::Display;

/// Store-assigned identifier: a UUID string locally, often a number behind REST.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LeadId {
    Number(i64),
    Text(String),
}

impl Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LeadId::Number(id) => write!(f, "{id}"),
            LeadId::Text(id) => f.write_str(id),
        }
    }
}

/// A lead as the datastore holds it. Only `id` is guaranteed; the enrichment
/// fields are filled in by other systems and are read-only here.
///
/// Rows are schemaless on the wire, so text fields take any scalar and keep its
/// JSON rendering, and `score` also accepts numeric text.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedLead {
    pub id: Option<LeadId>,
    #[serde(deserialize_with = "lenient_text")]
    pub company_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub website_url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub funding_date: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub funding_amount: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub funding_round: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub linkedin_url: Option<String>,
    #[serde(deserialize_with = "lenient_score")]
    pub score: Option<f64>,
    #[serde(deserialize_with = "lenient_text")]
    pub score_detail: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub decision_maker_data: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub decision_maker_linkedin: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub decision_maker_email: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub created_at: Option<String>,
}

fn lenient_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => None,
        Value::String(text) => Some(text),
        other => Some(other.to_string()),
    })
}

/// Unparsable text reads as no score
fn lenient_score<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    })
}

impl PersistedLead {
    pub fn from_record(record: Record) -> Result<Self, DatastoreError> {
        let lead: PersistedLead = serde_json::from_value(Value::Object(record))
            .map_err(|error| DatastoreError::Decode(error.to_string()))?;
        if lead.id.is_none() {
            return Err(DatastoreError::Decode("record without id".to_owned()));
        }
        Ok(lead)
    }

    pub fn company_name(&self) -> &str {
        self.company_name.as_deref().unwrap_or_default()
    }

    pub fn website_url(&self) -> &str {
        self.website_url.as_deref().unwrap_or_default()
    }

    pub fn funding_round(&self) -> &str {
        self.funding_round.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn decodes_numeric_and_uuid_ids() {
        let lead = PersistedLead::from_record(record(json!({"id": 7, "company_name": "Acme"}))).unwrap();
        assert_eq!(lead.id, Some(LeadId::Number(7)));
        assert_eq!(lead.company_name(), "Acme");

        let lead = PersistedLead::from_record(record(json!({"id": "5f0c2c1e-1111-4e5b-9a3b-000000000000"}))).unwrap();
        assert_eq!(lead.id.unwrap().to_string(), "5f0c2c1e-1111-4e5b-9a3b-000000000000");
    }

    #[test]
    fn null_fields_read_as_empty() {
        let lead = PersistedLead::from_record(record(json!({
            "id": 1,
            "website_url": null,
            "score": 4.5,
            "decision_maker_email": "cto@acme.test"
        })))
        .unwrap();
        assert_eq!(lead.website_url(), "");
        assert_eq!(lead.funding_round(), "");
        assert_eq!(lead.score, Some(4.5));
        assert_eq!(lead.decision_maker_email.as_deref(), Some("cto@acme.test"));
    }

    #[test]
    fn missing_id_is_rejected() {
        assert!(matches!(
            PersistedLead::from_record(record(json!({"company_name": "Acme"}))),
            Err(DatastoreError::Decode(_))
        ));
    }

    #[test]
    fn scalar_values_of_any_type_are_read_as_text() {
        let lead = PersistedLead::from_record(record(json!({
            "id": 1,
            "company_name": "Acme",
            "funding_amount": 2500000,
            "funding_round": "Seed",
            "website_url": true,
            "decision_maker_data": {"name": "Ada"},
            "score": "7.5"
        })))
        .unwrap();
        assert_eq!(lead.funding_amount.as_deref(), Some("2500000"));
        assert_eq!(lead.website_url(), "true");
        assert_eq!(lead.decision_maker_data.as_deref(), Some(r#"{"name":"Ada"}"#));
        assert_eq!(lead.score, Some(7.5));

        let lead = PersistedLead::from_record(record(json!({"id": 2, "score": "high"}))).unwrap();
        assert_eq!(lead.score, None);
    }

    #[test]
    fn malformed_id_is_rejected() {
        assert!(matches!(
            PersistedLead::from_record(record(json!({"id": [1]}))),
            Err(DatastoreError::Decode(_))
        ));
    }
}
