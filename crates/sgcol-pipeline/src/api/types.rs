//! Wire types for the data.gov.sg datastore search action

use serde::Deserialize;
use sgcol_common::Record;

use crate::error::FetchError;

/// One page of a dataset as reported by the remote
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub records: Vec<Record>,
    /// Dataset size at the time this page was served; may change between pages
    pub total: u64,
}

/// `{ "success": bool, "result": { "records": [...], "total": int } }`
#[derive(Debug, Deserialize)]
pub struct ApiEnvelope {
    #[serde(default)]
    pub success: bool,
    pub result: Option<ApiResult>,
}

#[derive(Debug, Deserialize)]
pub struct ApiResult {
    #[serde(default)]
    pub records: Vec<Record>,
    pub total: u64,
}

impl ApiEnvelope {
    pub fn into_page(self) -> Result<Page, FetchError> {
        if !self.success {
            return Err(FetchError::MalformedResponse(
                "API returned success=false".to_string(),
            ));
        }

        let result = self.result.ok_or_else(|| {
            FetchError::MalformedResponse("response has no result object".to_string())
        })?;

        Ok(Page {
            records: result.records,
            total: result.total,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_success_envelope_becomes_page() {
        let body = r#"{
            "help": "https://data.gov.sg/api/3/action/help_show?name=datastore_search",
            "success": true,
            "result": {
                "resource_id": "d_8b84c4ee58e3cfc0ece0d773c8ca6abc",
                "records": [
                    {"_id": 1, "month": "2017-01", "town": "ANG MO KIO", "resale_price": "232000"},
                    {"_id": 2, "month": "2017-01", "town": "ANG MO KIO", "resale_price": "250000"}
                ],
                "total": 218000
            }
        }"#;

        let page = serde_json::from_str::<ApiEnvelope>(body)
            .unwrap()
            .into_page()
            .unwrap();

        assert_eq!(page.total, 218_000);
        assert_eq!(page.records.len(), 2);
        assert_eq!(page.records[0]["town"], "ANG MO KIO");
    }

    #[test]
    fn test_records_keep_remote_key_order() {
        let body = r#"{"success": true, "result": {"records": [{"month":"2017-01","town":"ANG MO KIO","_id":1}], "total": 1}}"#;

        let page = serde_json::from_str::<ApiEnvelope>(body)
            .unwrap()
            .into_page()
            .unwrap();

        let keys: Vec<&str> = page.records[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["month", "town", "_id"]);
        assert_eq!(
            serde_json::to_string(&page.records[0]).unwrap(),
            r#"{"month":"2017-01","town":"ANG MO KIO","_id":1}"#
        );
    }

    #[test]
    fn test_success_false_is_malformed() {
        let body = r#"{"success": false, "error": {"message": "Not found"}}"#;
        let err = serde_json::from_str::<ApiEnvelope>(body)
            .unwrap()
            .into_page()
            .unwrap_err();

        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }

    #[test]
    fn test_missing_result_is_malformed() {
        let err = serde_json::from_str::<ApiEnvelope>(r#"{"success": true}"#)
            .unwrap()
            .into_page()
            .unwrap_err();

        assert!(matches!(err, FetchError::MalformedResponse(_)));
    }
}
