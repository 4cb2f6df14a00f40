//! Character directory lookups
//!
//! The engine only needs a character's name and GM level. The daemon resolves
//! them over HTTP from the character service's JSON:API endpoint.

use std::sync::OnceLock;
use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::db::TenantContext;
use crate::error::BuddyError;

/// Header carrying the tenant id on outbound requests
pub const TENANT_HEADER: &str = "TENANT_ID";

/// The subset of a character the engine reads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
    pub id: u32,
    pub name: String,
    pub gm: u8,
}

impl Character {
    pub fn is_gm(&self) -> bool {
        self.gm > 0
    }
}

/// Resolves characters by id
///
/// Any error is treated by callers as "character not found".
pub trait CharacterDirectory: Send + Sync {
    fn get_by_id(&self, ctx: &TenantContext, character_id: u32) -> Result<Character, BuddyError>;
}

#[derive(Debug, Deserialize)]
struct Document {
    data: Resource,
}

#[derive(Debug, Deserialize)]
struct Resource {
    id: String,
    attributes: Attributes,
}

#[derive(Debug, Deserialize)]
struct Attributes {
    name: String,
    #[serde(default)]
    gm: u8,
}

impl Document {
    fn into_character(self) -> Result<Character, BuddyError> {
        let id = self
            .data
            .id
            .parse::<u32>()
            .map_err(|e| BuddyError::Directory(format!("Invalid character id '{}': {}", self.data.id, e)))?;
        Ok(Character {
            id,
            name: self.data.attributes.name,
            gm: self.data.attributes.gm,
        })
    }
}

/// Character directory backed by `GET {base_url}/characters/{id}`
///
/// Uses a blocking client; call from a blocking worker, never from async code.
pub struct HttpCharacterDirectory {
    base_url: String,
    timeout: Duration,
    client: OnceLock<reqwest::blocking::Client>,
}

impl HttpCharacterDirectory {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
            client: OnceLock::new(),
        }
    }

    /// The blocking client spins up its own runtime, so it is built on first
    /// use from a blocking thread rather than at construction.
    fn client(&self) -> Result<&reqwest::blocking::Client, BuddyError> {
        if let Some(client) = self.client.get() {
            return Ok(client);
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent("buddy-lists/0.1")
            .build()
            .map_err(|e| BuddyError::Directory(format!("Unable to build HTTP client: {}", e)))?;
        Ok(self.client.get_or_init(|| client))
    }

    fn url(&self, character_id: u32) -> String {
        format!("{}/characters/{}", self.base_url, character_id)
    }
}

impl CharacterDirectory for HttpCharacterDirectory {
    fn get_by_id(&self, ctx: &TenantContext, character_id: u32) -> Result<Character, BuddyError> {
        let url = self.url(character_id);
        debug!(url = %url, "Resolving character");

        let response = self
            .client()?
            .get(&url)
            .header(TENANT_HEADER, ctx.key())
            .send()
            .map_err(|e| BuddyError::Directory(format!("Request to {} failed: {}", url, e)))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BuddyError::TargetNotFound(character_id));
        }
        if !response.status().is_success() {
            return Err(BuddyError::Directory(format!(
                "Character service returned {} for {}",
                response.status(),
                character_id
            )));
        }

        let document: Document = response
            .json()
            .map_err(|e| BuddyError::Directory(format!("Invalid character document: {}", e)))?;
        document.into_character()
    }
}
