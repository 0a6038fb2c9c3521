// Airbnb listing search

use crate::protocol::{CallToolResult, ToolSchema};
use crate::tools::client::{extract_client_data, AirbnbClient};
use crate::tools::projection::{clean, pick};
use crate::tools::robots::{RobotsPolicy, ROBOTS_DISALLOWED_MESSAGE};
use crate::tools::{
    json_schema_boolean, json_schema_number, json_schema_object, json_schema_string, Tool,
    ToolError, ToolName,
};
use anyhow::Result;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use url::Url;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchArgs {
    location: String,
    #[serde(default)]
    place_id: Option<String>,
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
    min_price: Option<u32>,
    #[serde(default)]
    max_price: Option<u32>,
    #[serde(default)]
    cursor: Option<String>,
    #[serde(default)]
    ignore_robots_text: bool,
}

/// Fields of each search result worth returning to a caller
fn search_result_schema() -> Value {
    json!({
        "demandStayListing": {
            "id": true,
            "description": true,
            "location": true
        },
        "badges": { "text": true },
        "structuredContent": {
            "mapCategoryInfo": { "body": true },
            "mapSecondaryLine": { "body": true },
            "primaryLine": { "body": true },
            "secondaryLine": { "body": true }
        },
        "avgRatingA11yLabel": true,
        "listingParamOverrides": true,
        "structuredDisplayPrice": {
            "primaryLine": { "accessibilityLabel": true },
            "secondaryLine": { "accessibilityLabel": true },
            "explanationData": {
                "title": true,
                "priceDetails": {
                    "items": {
                        "description": true,
                        "priceString": true
                    }
                }
            }
        }
    })
}

/// Tool that searches Airbnb for stays in a location
pub struct SearchTool {
    client: Arc<AirbnbClient>,
    robots: Arc<RobotsPolicy>,
}

impl SearchTool {
    pub fn new(client: Arc<AirbnbClient>, robots: Arc<RobotsPolicy>) -> Self {
        Self { client, robots }
    }

    fn search_url(&self, args: &SearchArgs) -> Result<Url> {
        let mut url = self.client.url_for(&["s", args.location.as_str(), "homes"])?;

        {
            let mut query = url.query_pairs_mut();
            if let Some(place_id) = &args.place_id {
                query.append_pair("place_id", place_id);
            }
            if let Some(checkin) = &args.checkin {
                query.append_pair("checkin", checkin);
            }
            if let Some(checkout) = &args.checkout {
                query.append_pair("checkout", checkout);
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
            if let Some(min_price) = args.min_price {
                query.append_pair("price_min", &min_price.to_string());
            }
            if let Some(max_price) = args.max_price {
                query.append_pair("price_max", &max_price.to_string());
            }
            if let Some(cursor) = &args.cursor {
                query.append_pair("cursor", cursor);
            }
        }

        Ok(url)
    }

    async fn run_search(&self, url: &Url) -> Result<Value> {
        let html = self.client.fetch_text(url).await?;
        let client_data = extract_client_data(&html)?;
        Ok(shape_search_results(&client_data, self.client.base_url()))
    }
}

/// Turn `staysSearch.results` into `{searchResults, paginationInfo}`.
fn shape_search_results(client_data: &Value, base_url: &Url) -> Value {
    let results = client_data
        .pointer("/data/presentation/staysSearch/results")
        .cloned()
        .unwrap_or(Value::Null);

    let schema = search_result_schema();
    let search_results: Vec<Value> = results
        .get("searchResults")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| pick(item, &schema))
                .map(|item| attach_listing_id(item, base_url))
                .collect()
        })
        .unwrap_or_default();

    json!({
        "searchResults": search_results,
        "paginationInfo": results.get("paginationInfo").and_then(clean).unwrap_or(Value::Null),
    })
}

/// Listing ids arrive base64-encoded as `DemandStayListing:<id>`. Prefix the
/// result with the decoded id and the listing URL.
fn attach_listing_id(item: Value, base_url: &Url) -> Value {
    let encoded = item
        .pointer("/demandStayListing/id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let Some(encoded) = encoded else {
        return item;
    };

    let id = base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .and_then(|decoded| decoded.split(':').nth(1).map(str::to_string))
        .unwrap_or(encoded);

    let mut listing_url = base_url.clone();
    if let Ok(mut segments) = listing_url.path_segments_mut() {
        segments.pop_if_empty().extend(["rooms", id.as_str()]);
    }

    let mut shaped = Map::new();
    shaped.insert("id".to_string(), Value::String(id));
    shaped.insert("url".to_string(), Value::String(listing_url.to_string()));
    if let Value::Object(fields) = item {
        shaped.extend(fields);
    }
    Value::Object(shaped)
}

#[async_trait::async_trait]
impl Tool for SearchTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: ToolName::AirbnbSearch.as_str().to_string(),
            description: "Search for Airbnb listings with various filters and pagination. Provide direct links to the user".to_string(),
            input_schema: json_schema_object(
                json!({
                    "location": json_schema_string("Location to search for (city, state, etc.)"),
                    "placeId": json_schema_string("Google Maps Place ID (overrides the location parameter)"),
                    "checkin": json_schema_string("Check-in date (YYYY-MM-DD)"),
                    "checkout": json_schema_string("Check-out date (YYYY-MM-DD)"),
                    "adults": json_schema_number("Number of adults"),
                    "children": json_schema_number("Number of children"),
                    "infants": json_schema_number("Number of infants"),
                    "pets": json_schema_number("Number of pets"),
                    "minPrice": json_schema_number("Minimum price for the stay"),
                    "maxPrice": json_schema_number("Maximum price for the stay"),
                    "cursor": json_schema_string("Base64-encoded string used for Pagination"),
                    "ignoreRobotsText": json_schema_boolean("Ignore robots.txt rules for this request")
                }),
                vec!["location"],
            ),
        }
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<CallToolResult> {
        let args: SearchArgs =
            serde_json::from_value(Value::Object(arguments)).map_err(|e| ToolError::InvalidArguments {
                tool: ToolName::AirbnbSearch.as_str().to_string(),
                message: e.to_string(),
            })?;

        if args.location.trim().is_empty() {
            return Err(ToolError::InvalidArguments {
                tool: ToolName::AirbnbSearch.as_str().to_string(),
                message: "location must not be empty".to_string(),
            }
            .into());
        }

        let url = self.search_url(&args)?;

        if !self.robots.is_allowed(&url, args.ignore_robots_text) {
            return Ok(CallToolResult::json(
                &json!({ "error": ROBOTS_DISALLOWED_MESSAGE, "url": url.as_str() }),
                true,
            ));
        }

        match self.run_search(&url).await {
            Ok(results) => {
                let mut body = Map::new();
                body.insert("searchUrl".to_string(), Value::String(url.to_string()));
                if let Value::Object(fields) = results {
                    body.extend(fields);
                }
                Ok(CallToolResult::json(&Value::Object(body), false))
            }
            Err(err) => {
                tracing::warn!(url = %url, error = %format!("{err:#}"), "Airbnb search failed");
                Ok(CallToolResult::json(
                    &json!({ "error": format!("{err:#}"), "searchUrl": url.as_str() }),
                    true,
                ))
            }
        }
    }
}
