//! Client side of the Profile Store HTTP service, which keeps one profile per
//! caller address and the search queries recorded against it.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

/// Scalar values allowed in a profile's free-form info map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProfileScalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

pub type ProfileInfo = BTreeMap<String, ProfileScalar>;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchQueryRecord {
    pub id: i64,
    pub body: String,
    #[serde(default)]
    pub visited_urls: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Profile {
    pub id: i64,
    pub ip: String,
    #[serde(default)]
    pub info: Option<ProfileInfo>,
    #[serde(default)]
    pub search_queries: Vec<SearchQueryRecord>,
}

/// One entry of the bulk listing used by the trainer.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ProfileQueries {
    pub search_id: i64,
    pub body: String,
    #[serde(default)]
    pub visited_urls: Option<Vec<String>>,
}

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("profile store request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("profile store answered {status} for {endpoint}")]
    Status { endpoint: String, status: u16 },
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn fetch_profile(&self, ip: &str) -> Result<Option<Profile>, ProfileError>;

    async fn create_profile(&self, ip: &str, info: &ProfileInfo) -> Result<i64, ProfileError>;

    async fn create_search_query(&self, profile_id: i64, query: &str, visited_urls: &[String]) -> Result<i64, ProfileError>;

    async fn append_visited_url(&self, query_id: i64, url: &str) -> Result<(), ProfileError>;

    async fn list_profiles(&self) -> Result<Vec<(i64, Vec<ProfileQueries>)>, ProfileError>;
}

/// Key a caller address the way the Profile Store indexes it: IPv4 octets
/// zero-padded to three digits and concatenated, anything else verbatim.
pub fn profile_key(ip: IpAddr) -> String {
    match ip {
        IpAddr::V4(v4) => v4.octets().iter().map(|o| format!("{o:03}")).collect(),
        IpAddr::V6(v6) => v6.to_string(),
    }
}

pub struct HttpProfileStore {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: i64,
}

#[derive(Deserialize)]
struct ProfileEnvelope {
    user_profile: Profile,
}

#[derive(Deserialize)]
struct ProfileListing {
    user_profiles: Vec<(i64, Vec<ProfileQueries>)>,
}

impl HttpProfileStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ProfileError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn check(endpoint: &str, status: StatusCode) -> Result<(), ProfileError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ProfileError::Status { endpoint: endpoint.to_string(), status: status.as_u16() })
    }
}

#[async_trait]
impl ProfileStore for HttpProfileStore {
    async fn fetch_profile(&self, ip: &str) -> Result<Option<Profile>, ProfileError> {
        let url = self.endpoint(&format!("/user_profiles/{ip}/"));
        let resp = self.client.get(&url).send().await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check(&url, resp.status())?;
        let envelope: ProfileEnvelope = resp.json().await?;
        Ok(Some(envelope.user_profile))
    }

    async fn create_profile(&self, ip: &str, info: &ProfileInfo) -> Result<i64, ProfileError> {
        let url = self.endpoint("/user_profiles/");
        let resp = self.client.post(&url).json(&json!({ "ip": ip, "info": info })).send().await?;
        check(&url, resp.status())?;
        Ok(resp.json::<IdResponse>().await?.id)
    }

    async fn create_search_query(&self, profile_id: i64, query: &str, visited_urls: &[String]) -> Result<i64, ProfileError> {
        let url = self.endpoint("/search_queries/");
        let body = json!({ "user_profile_id": profile_id, "query": query, "visited_urls": visited_urls });
        let resp = self.client.post(&url).json(&body).send().await?;
        check(&url, resp.status())?;
        Ok(resp.json::<IdResponse>().await?.id)
    }

    async fn append_visited_url(&self, query_id: i64, visited: &str) -> Result<(), ProfileError> {
        let url = self.endpoint(&format!("/search-queries/{query_id}/visited-urls/"));
        let resp = self.client.patch(&url).json(&json!({ "url": visited })).send().await?;
        check(&url, resp.status())
    }

    async fn list_profiles(&self) -> Result<Vec<(i64, Vec<ProfileQueries>)>, ProfileError> {
        let url = self.endpoint("/user_profiles/");
        let resp = self.client.get(&url).send().await?;
        check(&url, resp.status())?;
        Ok(resp.json::<ProfileListing>().await?.user_profiles)
    }
}
