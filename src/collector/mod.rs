//! JMX bean 수집 모듈
//!
//! Bean server 추상화와 구현체(Jolokia HTTP, in-process registry)를 제공합니다.
//!
//! # Example
//!
//! ```ignore
//! use jmx_bridge::collector::{BeanServer, JolokiaClient, ObjectNamePattern};
//!
//! let client = JolokiaClient::new("http://localhost:8778/jolokia", 5000)?;
//! let names = client.query_names(&ObjectNamePattern::all()).await?;
//! ```

mod client;
mod local;
mod object_name;
mod parser;
mod value;

use async_trait::async_trait;

pub use client::JolokiaClient;
pub use local::{LocalBeanServer, ManagedBean, StaticBean};
pub use object_name::{parse_key_properties, KeyProperties, ObjectName, ObjectNamePattern};
pub use parser::{
    bean_value_from_json, parse_attribute_list, parse_response, parse_search_value,
    CollectResult, JolokiaResponse, RequestInfo, TABULAR_INDEX_KEY,
};
pub use value::{
    AttributeInfo, BeanValue, CompositeField, CompositeValue, ScalarValue, TabularValue,
    COMPOSITE_TYPE, TABULAR_TYPE,
};

/// Bean server 추상화
///
/// The scraper only needs these three queries, so a remote Jolokia agent and
/// an in-process registry are interchangeable.
#[async_trait]
pub trait BeanServer: Send + Sync {
    /// 패턴에 맞는 bean 이름 조회
    async fn query_names(&self, pattern: &ObjectNamePattern) -> CollectResult<Vec<ObjectName>>;

    /// bean의 속성 메타데이터 조회
    async fn attribute_infos(&self, name: &ObjectName) -> CollectResult<Vec<AttributeInfo>>;

    /// 여러 속성 값을 한 번에 조회
    ///
    /// Returns `(attribute name, value)` pairs. Attributes the server could
    /// not read may be missing from the result.
    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[AttributeInfo],
    ) -> CollectResult<Vec<(String, BeanValue)>>;
}
