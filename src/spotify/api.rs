use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use error_stack::{IntoReport, Report, ResultExt};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Response, StatusCode};
use url::Url;

use crate::spotify::playlist::{PlaylistPage, RemotePlaylist, TokenResponse};
use crate::spotify::{CatalogError, CatalogResult, PlaylistCatalog};

const ACCOUNTS_BASE_URL: &str = "https://accounts.spotify.com/";
const API_BASE_URL: &str = "https://api.spotify.com/";
const PAGE_SIZE: &str = "50";

/// Minimal Spotify Web API client.
///
/// Authenticates with the client credentials flow, so only playlists the user
/// made public are visible.
#[derive(Debug, Clone)]
pub struct SpotifyApi {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_base: String,
    api_base: String,
}

impl SpotifyApi {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            accounts_base: ACCOUNTS_BASE_URL.to_string(),
            api_base: API_BASE_URL.to_string(),
        }
    }

    /// Points the client at other hosts, e.g. a mock server.
    pub fn with_base_urls(mut self, accounts_base: &str, api_base: &str) -> Self {
        self.accounts_base = accounts_base.to_string();
        self.api_base = api_base.to_string();
        self
    }

    async fn request_token(&self) -> CatalogResult<String> {
        let token_url = Url::parse(&self.accounts_base)
            .and_then(|base| base.join("api/token"))
            .into_report()
            .change_context(CatalogError::Decode)
            .attach_printable(format!("Invalid accounts url {}", self.accounts_base))?;
        let auth_string = format!("{}:{}", self.client_id, self.client_secret);
        let encoded_auth = general_purpose::STANDARD.encode(auth_string);

        let response = self
            .client
            .post(token_url)
            .header("Authorization", format!("Basic {}", encoded_auth))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .into_report()
            .change_context(CatalogError::TransientNetwork)
            .attach_printable("Failed to reach the Spotify accounts service")?;
        let response = check_status(response, None).await?;
        let token = response
            .json::<TokenResponse>()
            .await
            .into_report()
            .change_context(CatalogError::Decode)
            .attach_printable("Failed to decode the Spotify token response")?;
        Ok(token.access_token)
    }

    fn playlists_url(&self, user: &str) -> CatalogResult<Url> {
        let mut url = Url::parse(&self.api_base)
            .into_report()
            .change_context(CatalogError::Decode)
            .attach_printable(format!("Invalid api url {}", self.api_base))?;
        url.path_segments_mut()
            .map_err(|_| {
                Report::new(CatalogError::Decode)
                    .attach_printable(format!("{} cannot be a base url", self.api_base))
            })?
            .pop_if_empty()
            .extend(["v1", "users", user, "playlists"]);
        url.query_pairs_mut().append_pair("limit", PAGE_SIZE);
        Ok(url)
    }
}

#[async_trait]
impl PlaylistCatalog for SpotifyApi {
    async fn fetch_playlists(&self, user: &str) -> CatalogResult<Vec<RemotePlaylist>> {
        let access_token = self.request_token().await?;

        let mut playlists = vec![];
        let mut next_url = Some(self.playlists_url(user)?.to_string());
        while let Some(url) = next_url {
            log::debug!("Fetching playlist page {url}");
            let response = self
                .client
                .get(&url)
                .bearer_auth(&access_token)
                .send()
                .await
                .into_report()
                .change_context(CatalogError::TransientNetwork)
                .attach_printable(format!("Failed to request {url}"))?;
            let response = check_status(response, Some(user)).await?;
            let page = response
                .json::<PlaylistPage>()
                .await
                .into_report()
                .change_context(CatalogError::Decode)
                .attach_printable(format!("Failed to decode the playlist page {url}"))?;

            playlists.extend(page.items.into_iter().flatten().map(RemotePlaylist::from));
            next_url = page.next;
        }

        log::info!("Spotify lists {} playlists for {}", playlists.len(), user);
        Ok(playlists)
    }
}

/// Maps an HTTP status to a [`CatalogError`]. `user` is set for requests that
/// name a user, so a 404 can be reported as an unknown user.
pub(crate) fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    user: Option<&str>,
) -> Option<CatalogError> {
    if status.is_success() {
        return None;
    }
    let error = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            CatalogError::Auth
        }
        StatusCode::NOT_FOUND => match user {
            Some(user) => CatalogError::UnknownUser(user.to_string()),
            None => CatalogError::Decode,
        },
        StatusCode::TOO_MANY_REQUESTS => CatalogError::RateLimited {
            retry_after: retry_after(headers),
        },
        status if status.is_server_error() => CatalogError::TransientNetwork,
        StatusCode::REQUEST_TIMEOUT => CatalogError::TransientNetwork,
        _ => CatalogError::Decode,
    };
    Some(error)
}

fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

async fn check_status(response: Response, user: Option<&str>) -> CatalogResult<Response> {
    let status = response.status();
    let Some(error) = classify_status(status, response.headers(), user) else {
        return Ok(response);
    };
    let body = response.text().await.unwrap_or_default();
    let body = body.trim().chars().take(240).collect::<String>();
    Err(Report::new(error).attach_printable(format!("HTTP status {status}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use wiremock::matchers::{body_string_contains, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn api_for(server: &MockServer) -> SpotifyApi {
        SpotifyApi::new("id", "secret").with_base_urls(&server.uri(), &server.uri())
    }

    async fn mount_token(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .and(header("Authorization", "Basic aWQ6c2VjcmV0"))
            .and(body_string_contains("grant_type=client_credentials"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({
                    "access_token": "token-123",
                    "token_type": "Bearer",
                    "expires_in": 3600
                })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn follows_next_links_across_pages() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        let second_page = format!("{}/v1/users/alice/playlists?limit=50&offset=50", server.uri());

        Mock::given(method("GET"))
            .and(path("/v1/users/alice/playlists"))
            .and(query_param("offset", "50"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "p2", "name": "Focus", "external_urls": {"spotify": "https://open.spotify.com/playlist/p2"}}
                ],
                "next": null
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/users/alice/playlists"))
            .and(query_param("limit", "50"))
            .and(header("Authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "items": [
                    {"id": "p1", "name": "Road Trip", "external_urls": {"spotify": "https://open.spotify.com/playlist/p1"}},
                    null
                ],
                "next": second_page
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        let playlists = api_for(&server).fetch_playlists("alice").await.unwrap();
        let names: Vec<&str> = playlists.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Road Trip", "Focus"]);
        assert_eq!(playlists[1].url, "https://open.spotify.com/playlist/p2");
    }

    #[tokio::test]
    async fn rejected_credentials_are_auth_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token"))
            .respond_with(ResponseTemplate::new(400).set_body_string(r#"{"error":"invalid_client"}"#))
            .mount(&server)
            .await;

        let report = api_for(&server).fetch_playlists("alice").await.unwrap_err();
        assert_eq!(report.current_context(), &CatalogError::Auth);
    }

    #[tokio::test]
    async fn unknown_user_is_reported() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/users/nobody/playlists"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let report = api_for(&server).fetch_playlists("nobody").await.unwrap_err();
        assert_eq!(
            report.current_context(),
            &CatalogError::UnknownUser("nobody".to_string())
        );
    }

    #[tokio::test]
    async fn throttled_listing_carries_retry_after() {
        let server = MockServer::start().await;
        mount_token(&server).await;
        Mock::given(method("GET"))
            .and(path("/v1/users/alice/playlists"))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "7"))
            .mount(&server)
            .await;

        let report = api_for(&server).fetch_playlists("alice").await.unwrap_err();
        assert_eq!(
            report.current_context(),
            &CatalogError::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(report.current_context().is_retryable());
    }

    #[test]
    fn classifies_statuses() {
        let mut headers = HeaderMap::new();
        assert_eq!(classify_status(StatusCode::OK, &headers, None), None);
        assert_eq!(
            classify_status(StatusCode::UNAUTHORIZED, &headers, Some("a")),
            Some(CatalogError::Auth)
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY, &headers, Some("a")),
            Some(CatalogError::TransientNetwork)
        );
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, None),
            Some(CatalogError::RateLimited { retry_after: None })
        );
        headers.insert(RETRY_AFTER, HeaderValue::from_static("not-a-number"));
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, &headers, None),
            Some(CatalogError::RateLimited { retry_after: None })
        );
    }

    #[test]
    fn user_names_are_escaped_in_the_path() {
        let api = SpotifyApi::new("id", "secret");
        let url = api.playlists_url("road trip/1").unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.spotify.com/v1/users/road%20trip%2F1/playlists?limit=50"
        );
    }
}
