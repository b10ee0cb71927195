//! Jolokia HTTP 클라이언트
//!
//! Connection pooling과 타임아웃을 지원하는 비동기 HTTP 클라이언트입니다.

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use super::object_name::{ObjectName, ObjectNamePattern};
use super::parser::{
    bean_value_from_json, parse_attribute_list, parse_response, parse_search_value,
    CollectResult,
};
use super::value::{AttributeInfo, BeanValue};
use super::BeanServer;
use crate::error::CollectorError;

/// Jolokia HTTP 클라이언트
#[derive(Clone)]
pub struct JolokiaClient {
    client: Client,
    base_url: String,
    timeout_ms: u64,
    auth: Option<(String, String)>,
}

/// Jolokia 요청 구조체
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum JolokiaRequest<'a> {
    Search { mbean: &'a str },
    List { path: String },
    Read { mbean: &'a str, attribute: Vec<&'a str> },
}

/// Escape an ObjectName for use inside a Jolokia list path
fn escape_path(segment: &str) -> String {
    segment.replace('!', "!!").replace('/', "!/")
}

impl JolokiaClient {
    /// 새 클라이언트 생성
    ///
    /// # Arguments
    /// * `base_url` - Jolokia 엔드포인트 URL (예: "http://localhost:8778/jolokia")
    /// * `timeout_ms` - 요청 타임아웃 (밀리초)
    pub fn new(base_url: &str, timeout_ms: u64) -> CollectResult<Self> {
        url::Url::parse(base_url).map_err(|e| {
            CollectorError::ConnectionFailed(format!("invalid Jolokia URL '{}': {}", base_url, e))
        })?;

        let client = ClientBuilder::new()
            .timeout(Duration::from_millis(timeout_ms))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(CollectorError::HttpClientInit)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout_ms,
            auth: None,
        })
    }

    /// Basic Auth 설정
    pub fn with_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = Some((username.to_string(), password.to_string()));
        self
    }

    /// 엔드포인트 URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// 요청 전송 후 응답 값 반환
    async fn execute(&self, request: &JolokiaRequest<'_>) -> CollectResult<Value> {
        let mut req = self.client.post(&self.base_url).json(request);

        if let Some((username, password)) = &self.auth {
            req = req.basic_auth(username, Some(password));
        }

        let response = req.send().await.map_err(|e| self.request_error(e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CollectorError::AuthenticationFailed);
        }
        if !status.is_success() {
            return Err(CollectorError::HttpStatus(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.request_error(e))?;

        parse_response(&body)?.into_result()
    }

    fn request_error(&self, err: reqwest::Error) -> CollectorError {
        if err.is_timeout() {
            CollectorError::timeout_with_duration(self.timeout_ms)
        } else {
            err.into()
        }
    }

    /// MBean 목록 조회 (Search)
    #[instrument(skip(self))]
    pub async fn search(&self, pattern: &str) -> CollectResult<Vec<String>> {
        let value = self.execute(&JolokiaRequest::Search { mbean: pattern }).await?;
        parse_search_value(value)
    }

    /// MBean 메타데이터 조회 (List)
    #[instrument(skip(self), fields(mbean = %name))]
    pub async fn list(&self, name: &ObjectName) -> CollectResult<Vec<AttributeInfo>> {
        let path = format!(
            "{}/{}",
            escape_path(name.domain()),
            escape_path(name.key_property_list())
        );
        let value = self.execute(&JolokiaRequest::List { path }).await?;
        parse_attribute_list(&value)
    }

    /// 여러 속성 값 조회 (Read)
    #[instrument(skip(self, attributes), fields(mbean = %name, count = attributes.len()))]
    pub async fn read(
        &self,
        name: &ObjectName,
        attributes: &[AttributeInfo],
    ) -> CollectResult<Vec<(String, BeanValue)>> {
        if attributes.is_empty() {
            return Ok(vec![]);
        }

        let mbean = name.to_string();
        let request = JolokiaRequest::Read {
            mbean: &mbean,
            attribute: attributes.iter().map(|a| a.name.as_str()).collect(),
        };

        debug!("Sending Jolokia read request");

        let mut values: HashMap<String, Value> = match self.execute(&request).await? {
            Value::Object(map) => map.into_iter().collect(),
            other => {
                return Err(CollectorError::JsonParse(format!(
                    "read value for {} must be an object, got {}",
                    mbean, other
                )))
            }
        };

        let mut result = Vec::with_capacity(attributes.len());
        for info in attributes {
            match values.remove(&info.name) {
                Some(value) => {
                    result.push((info.name.clone(), bean_value_from_json(value, &info.type_name)))
                }
                None => warn!(mbean = %mbean, attribute = %info.name, "Attribute missing from read response"),
            }
        }

        Ok(result)
    }
}

#[async_trait]
impl BeanServer for JolokiaClient {
    async fn query_names(&self, pattern: &ObjectNamePattern) -> CollectResult<Vec<ObjectName>> {
        let names = self.search(pattern.as_str()).await?;

        Ok(names
            .into_iter()
            .filter_map(|raw| match ObjectName::parse(&raw) {
                Ok(name) => Some(name),
                Err(e) => {
                    warn!(name = %raw, error = %e, "Skipping unparsable ObjectName");
                    None
                }
            })
            .collect())
    }

    async fn attribute_infos(&self, name: &ObjectName) -> CollectResult<Vec<AttributeInfo>> {
        self.list(name).await
    }

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[AttributeInfo],
    ) -> CollectResult<Vec<(String, BeanValue)>> {
        self.read(name, attributes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_new() {
        let client = JolokiaClient::new("http://localhost:8778/jolokia/", 5000);
        assert!(client.is_ok());
        assert_eq!(client.unwrap().base_url(), "http://localhost:8778/jolokia");
    }

    #[test]
    fn test_client_rejects_invalid_url() {
        assert!(JolokiaClient::new("not a url", 5000).is_err());
    }

    #[test]
    fn test_client_with_auth() {
        let client = JolokiaClient::new("http://localhost:8778/jolokia", 5000)
            .unwrap()
            .with_auth("user", "pass");
        assert!(client.auth.is_some());
    }

    #[test]
    fn test_escape_path() {
        assert_eq!(escape_path("type=Foo/Bar"), "type=Foo!/Bar");
        assert_eq!(escape_path("name=a!b"), "name=a!!b");
    }

    #[test]
    fn test_request_serialization() {
        let search = serde_json::to_value(JolokiaRequest::Search { mbean: "*:*" }).unwrap();
        assert_eq!(search, serde_json::json!({"type": "search", "mbean": "*:*"}));

        let read = serde_json::to_value(JolokiaRequest::Read {
            mbean: "java.lang:type=Memory",
            attribute: vec!["HeapMemoryUsage"],
        })
        .unwrap();
        assert_eq!(
            read,
            serde_json::json!({
                "type": "read",
                "mbean": "java.lang:type=Memory",
                "attribute": ["HeapMemoryUsage"]
            })
        );
    }
}
