// Airbnb listing details

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::client::{extract_client_data, AirbnbClient};
use crate::tools::projection::{html_to_text, pick};
use crate::tools::robots::{RobotsPolicy, ROBOTS_DISALLOWED_MESSAGE};
use crate::tools::{
    json_schema_boolean, json_schema_number, json_schema_object, json_schema_string, Tool,
    ToolError, ToolName,
};
use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingArgs {
    id: Value,
    #[serde(default)]
    checkin: Option<String>,
    #[serde(default)]
    checkout: Option<String>,
    #[serde(default)]
    adults: Option<u32>,
    #[serde(default)]
    children: Option<u32>,
    #[serde(default)]
    infants: Option<u32>,
    #[serde(default)]
    pets: Option<u32>,
    #[serde(default)]
    ignore_robots_text: bool,
}

/// Listing ids may be sent as strings or numbers
fn listing_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Per-section allow-lists; sections not named here are dropped.
fn section_schema(section_id: &str) -> Option<Value> {
    let schema = match section_id {
        "LOCATION_DEFAULT" => json!({
            "lat": true,
            "lng": true,
            "subtitle": true,
            "title": true
        }),
        "POLICIES_DEFAULT" => json!({
            "title": true,
            "houseRulesSections": {
                "title": true,
                "items": { "title": true }
            }
        }),
        "HIGHLIGHTS_DEFAULT" => json!({
            "highlights": { "title": true }
        }),
        "DESCRIPTION_DEFAULT" => json!({
            "htmlDescription": { "htmlText": true }
        }),
        "AMENITIES_DEFAULT" => json!({
            "title": true,
            "seeAllAmenitiesGroups": {
                "title": true,
                "amenities": { "title": true }
            }
        }),
        _ => return None,
    };
    Some(schema)
}

/// Tool that fetches details for a single listing
pub struct ListingDetailsTool {
    client: Arc<AirbnbClient>,
    robots: Arc<RobotsPolicy>,
}

impl ListingDetailsTool {
    pub fn new(client: Arc<AirbnbClient>, robots: Arc<RobotsPolicy>) -> Self {
        Self { client, robots }
    }

    fn listing_url(&self, id: &str, args: &ListingArgs) -> Result<Url> {
        let mut url = self.client.url_for(&["rooms", id])?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(checkin) = &args.checkin {
                query.append_pair("check_in", checkin);
            }
            if let Some(checkout) = &args.checkout {
                query.append_pair("check_out", checkout);
            }

            let adults = args.adults.unwrap_or(1);
            let children = args.children.unwrap_or(0);
            if adults > 0 || children > 0 {
                query.append_pair("adults", &adults.to_string());
                query.append_pair("children", &children.to_string());
            }
            if let Some(infants) = args.infants.filter(|n| *n > 0) {
                query.append_pair("infants", &infants.to_string());
            }
            if let Some(pets) = args.pets.filter(|n| *n > 0) {
                query.append_pair("pets", &pets.to_string());
            }
        }

        Ok(url)
    }

    async fn fetch_details(&self, url: &Url) -> Result<Vec<Value>> {
        let html = self.client.fetch_text(url).await?;
        let client_data = extract_client_data(&html)?;
        shape_sections(&client_data)
    }
}

/// Project the page sections into `[{id, ...fields}]`.
fn shape_sections(client_data: &Value) -> Result<Vec<Value>> {
    let sections = client_data
        .pointer("/data/presentation/stayProductDetailPage/sections/sections")
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("Listing page did not contain any sections"))?;

    let details = sections
        .iter()
        .filter_map(|entry| {
            let section_id = entry.get("sectionId")?.as_str()?;
            let schema = section_schema(section_id)?;
            let mut picked = entry
                .get("section")
                .and_then(|section| pick(section, &schema))
                .unwrap_or_else(|| json!({}));

            if let Some(html) = picked
                .pointer_mut("/htmlDescription/htmlText")
                .and_then(|v| v.as_str().map(str::to_string))
            {
                picked["htmlDescription"]["htmlText"] = Value::String(html_to_text(&html));
            }

            let mut shaped = Map::new();
            shaped.insert("id".to_string(), Value::String(section_id.to_string()));
            if let Value::Object(fields) = picked {
                shaped.extend(fields);
            }
            Some(Value::Object(shaped))
        })
        .collect();

    Ok(details)
}

#[async_trait::async_trait]
impl Tool for ListingDetailsTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolName::AirbnbListingDetails.as_str().to_string(),
            description: "Get detailed information about a specific Airbnb listing. Provide direct links to the user".to_string(),
            input_schema: json_schema_object(
                json!({
                    "id": json_schema_string("The Airbnb listing ID"),
                    "checkin": json_schema_string("Check-in date (YYYY-MM-DD)"),
                    "checkout": json_schema_string("Check-out date (YYYY-MM-DD)"),
                    "adults": json_schema_number("Number of adults"),
                    "children": json_schema_number("Number of children"),
                    "infants": json_schema_number("Number of infants"),
                    "pets": json_schema_number("Number of pets"),
                    "ignoreRobotsText": json_schema_boolean("Ignore robots.txt rules for this request")
                }),
                vec!["id"],
            ),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult> {
        let invalid = |message: String| ToolError::InvalidArguments {
            tool: ToolName::AirbnbListingDetails.as_str().to_string(),
            message,
        };

        let args: ListingArgs =
            serde_json::from_value(Value::Object(arguments)).map_err(|e| invalid(e.to_string()))?;
        let id = listing_id(&args.id)
            .ok_or_else(|| invalid("id must be a non-empty string or number".to_string()))?;

        let url = self.listing_url(&id, &args)?;

        if !self.robots.is_allowed(&url, args.ignore_robots_text) {
            return Ok(CallToolResult::json(
                &json!({ "error": ROBOTS_DISALLOWED_MESSAGE, "url": url.as_str() }),
                true,
            ));
        }

        match self.fetch_details(&url).await {
            Ok(details) => Ok(CallToolResult::json(
                &json!({ "listingUrl": url.as_str(), "details": details }),
                false,
            )),
            Err(err) => {
                tracing::warn!(url = %url, error = %format!("{err:#}"), "Airbnb listing lookup failed");
                Ok(CallToolResult::json(
                    &json!({ "error": format!("{err:#}"), "listingUrl": url.as_str() }),
                    true,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use airbnb_mcp_core::config::AirbnbSection;

    fn tool() -> ListingDetailsTool {
        let client = Arc::new(AirbnbClient::new(&AirbnbSection::default()).unwrap());
        let robots = Arc::new(RobotsPolicy::new(client.clone(), true));
        ListingDetailsTool::new(client, robots)
    }

    #[test]
    fn test_listing_id_forms() {
        assert_eq!(listing_id(&json!("42")), Some("42".to_string()));
        assert_eq!(listing_id(&json!(42)), Some("42".to_string()));
        assert_eq!(listing_id(&json!("")), None);
        assert_eq!(listing_id(&json!(null)), None);
        assert_eq!(listing_id(&json!({"id": 1})), None);
    }

    #[test]
    fn test_listing_url() {
        let args: ListingArgs = serde_json::from_value(json!({
            "id": 42,
            "checkin": "2026-12-01",
            "checkout": "2026-12-03",
            "adults": 2,
            "infants": 1
        }))
        .unwrap();

        let url = tool().listing_url("42", &args).unwrap();
        assert_eq!(url.path(), "/rooms/42");
        let query = url.query().unwrap();
        assert!(query.contains("check_in=2026-12-01"));
        assert!(query.contains("check_out=2026-12-03"));
        assert!(query.contains("adults=2"));
        assert!(query.contains("infants=1"));
        assert!(!query.contains("pets"));
    }

    #[test]
    fn test_listing_url_extreme_guest_counts() {
        let args: ListingArgs = serde_json::from_value(json!({
            "id": "42",
            "adults": u32::MAX,
            "children": 1
        }))
        .unwrap();

        let url = tool().listing_url("42", &args).unwrap();
        let query = url.query().unwrap();
        assert!(query.contains(&format!("adults={}", u32::MAX)));
        assert!(query.contains("children=1"));
    }

    #[test]
    fn test_shape_sections() {
        let client_data = json!({
            "data": {"presentation": {"stayProductDetailPage": {"sections": {"sections": [
                {"sectionId": "LOCATION_DEFAULT", "section": {"lat": 38.7, "lng": -9.1, "title": "Where you'll be", "mapToken": "x"}},
                {"sectionId": "DESCRIPTION_DEFAULT", "section": {"htmlDescription": {"htmlText": "<p>Sunny&nbsp;room</p>"}}},
                {"sectionId": "REVIEWS_DEFAULT", "section": {"reviews": []}},
                {"sectionId": "AMENITIES_DEFAULT", "section": {
                    "title": "What this place offers",
                    "seeAllAmenitiesGroups": [{"title": "Kitchen", "amenities": [{"title": "Oven", "icon": "OVEN"}]}]
                }}
            ]}}}}
        });

        let details = shape_sections(&client_data).unwrap();
        assert_eq!(details.len(), 3);
        assert_eq!(
            details[0],
            json!({"id": "LOCATION_DEFAULT", "lat": 38.7, "lng": -9.1, "title": "Where you'll be"})
        );
        assert_eq!(details[1]["htmlDescription"]["htmlText"], json!("Sunny room"));
        assert_eq!(
            details[2]["seeAllAmenitiesGroups"],
            json!([{"title": "Kitchen", "amenities": [{"title": "Oven"}]}])
        );
    }

    #[test]
    fn test_shape_sections_missing() {
        assert!(shape_sections(&json!({"data": {}})).is_err());
    }

    #[tokio::test]
    async fn test_missing_id_is_invalid_params() {
        let err = tool().execute(Map::new()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ToolError>(),
            Some(ToolError::InvalidArguments { .. })
        ));
    }
}
