//! Google Sheets v4 REST client.

use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::auth::Authenticator;
use crate::client::check_response;
use crate::error::{DriveError, Result};
use crate::models::{
    BatchGetValuesResponse, BatchUpdateSpreadsheetResponse, BatchUpdateValuesResponse,
    SheetProperties, Spreadsheet, UpdateValuesResponse, ValueInputOption, ValueRange,
};
use crate::url_parser::spreadsheet_id;

/// Base URL for Google Sheets API v4.
const SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4";

/// Client for the Google Sheets REST API.
///
/// Every method accepts a spreadsheet URL or a bare spreadsheet ID.
pub struct SheetsClient {
    auth: Authenticator,
    http: Client,
    api_base: String,
}

impl SheetsClient {
    pub fn new(auth: Authenticator) -> Self {
        Self {
            auth,
            http: Client::new(),
            api_base: SHEETS_API_BASE.to_string(),
        }
    }

    /// Point the client at a different API endpoint.
    pub fn with_base_url(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Build `<api_base>/<segments...>` with each segment percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.api_base)
            .map_err(|e| DriveError::InvalidUrlOrId(format!("{}: {}", self.api_base, e)))?;
        url.path_segments_mut()
            .map_err(|_| DriveError::InvalidUrlOrId(self.api_base.clone()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Read a single range, e.g. `Class Data!A2:E`.
    pub async fn get_values(&self, spreadsheet: &str, range: &str) -> Result<ValueRange> {
        let id = spreadsheet_id(spreadsheet)?;
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .get(self.endpoint(&["spreadsheets", &id, "values", range])?)
            .bearer_auth(&token)
            .send()
            .await?;

        let values: ValueRange = check_response(response).await?.json().await?;
        debug!(spreadsheet_id = %id, range, rows = values.values.len(), "read range");
        Ok(values)
    }

    /// Read several ranges in one request.
    pub async fn batch_get_values(
        &self,
        spreadsheet: &str,
        ranges: &[String],
    ) -> Result<BatchGetValuesResponse> {
        let id = spreadsheet_id(spreadsheet)?;
        let token = self.auth.get_access_token().await?;
        let query: Vec<(&str, &str)> = ranges.iter().map(|r| ("ranges", r.as_str())).collect();

        let response = self
            .http
            .get(self.endpoint(&["spreadsheets", &id, "values:batchGet"])?)
            .bearer_auth(&token)
            .query(&query)
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    /// Create a new spreadsheet titled `title`.
    pub async fn create_spreadsheet(&self, title: &str) -> Result<Spreadsheet> {
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(self.endpoint(&["spreadsheets"])?)
            .bearer_auth(&token)
            .json(&json!({ "properties": { "title": title } }))
            .send()
            .await?;

        let spreadsheet: Spreadsheet = check_response(response).await?.json().await?;
        info!(spreadsheet_id = %spreadsheet.spreadsheet_id, title, "created spreadsheet");
        Ok(spreadsheet)
    }

    /// Apply structural requests (`addSheet`, `deleteSheet`, ...) to a spreadsheet.
    pub async fn batch_update(
        &self,
        spreadsheet: &str,
        requests: Vec<Value>,
    ) -> Result<BatchUpdateSpreadsheetResponse> {
        let id = spreadsheet_id(spreadsheet)?;
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(self.endpoint(&["spreadsheets", &format!("{}:batchUpdate", id)])?)
            .bearer_auth(&token)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }

    /// Add an empty sheet titled `title`.
    pub async fn add_sheet(&self, spreadsheet: &str, title: &str) -> Result<SheetProperties> {
        let request = json!({ "addSheet": { "properties": { "title": title } } });
        let response = self.batch_update(spreadsheet, vec![request]).await?;

        response
            .replies
            .into_iter()
            .find_map(|reply| reply.add_sheet)
            .map(|reply| reply.properties)
            .ok_or_else(|| missing_reply("addSheet"))
    }

    /// Duplicate the sheet `source_sheet_id` as `new_name`, optionally at `index`.
    pub async fn duplicate_sheet(
        &self,
        spreadsheet: &str,
        source_sheet_id: i64,
        new_name: &str,
        index: Option<i64>,
    ) -> Result<SheetProperties> {
        let mut duplicate = json!({
            "sourceSheetId": source_sheet_id,
            "newSheetName": new_name,
        });
        if let Some(index) = index {
            duplicate["insertSheetIndex"] = json!(index);
        }

        let response = self
            .batch_update(spreadsheet, vec![json!({ "duplicateSheet": duplicate })])
            .await?;

        response
            .replies
            .into_iter()
            .find_map(|reply| reply.duplicate_sheet)
            .map(|reply| reply.properties)
            .ok_or_else(|| missing_reply("duplicateSheet"))
    }

    /// Remove the sheet `sheet_id`.
    pub async fn delete_sheet(&self, spreadsheet: &str, sheet_id: i64) -> Result<()> {
        let request = json!({ "deleteSheet": { "sheetId": sheet_id } });
        self.batch_update(spreadsheet, vec![request]).await?;
        Ok(())
    }

    /// Overwrite a range with `values`.
    pub async fn update_values(
        &self,
        spreadsheet: &str,
        range: &str,
        values: Vec<Vec<Value>>,
        input: ValueInputOption,
    ) -> Result<UpdateValuesResponse> {
        let id = spreadsheet_id(spreadsheet)?;
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .put(self.endpoint(&["spreadsheets", &id, "values", range])?)
            .bearer_auth(&token)
            .query(&[("valueInputOption", input.as_str())])
            .json(&ValueRange::new(range, values))
            .send()
            .await?;

        let updated: UpdateValuesResponse = check_response(response).await?.json().await?;
        info!(spreadsheet_id = %id, range, cells = updated.updated_cells, "updated values");
        Ok(updated)
    }

    /// Overwrite several ranges in one request.
    pub async fn batch_update_values(
        &self,
        spreadsheet: &str,
        data: Vec<ValueRange>,
        input: ValueInputOption,
    ) -> Result<BatchUpdateValuesResponse> {
        let id = spreadsheet_id(spreadsheet)?;
        let token = self.auth.get_access_token().await?;

        let response = self
            .http
            .post(self.endpoint(&["spreadsheets", &id, "values:batchUpdate"])?)
            .bearer_auth(&token)
            .json(&json!({ "valueInputOption": input, "data": data }))
            .send()
            .await?;

        Ok(check_response(response).await?.json().await?)
    }
}

fn missing_reply(kind: &str) -> DriveError {
    DriveError::ApiError {
        status: 500,
        message: format!("No {} reply in response", kind),
    }
}
