//! In-process bean registry
//!
//! Lets applications embed the exporter and publish their own beans without
//! running a Jolokia agent.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use super::object_name::{ObjectName, ObjectNamePattern};
use super::parser::CollectResult;
use super::value::{AttributeInfo, BeanValue};
use super::BeanServer;
use crate::error::CollectorError;

/// A bean that can be registered with [`LocalBeanServer`]
pub trait ManagedBean: Send + Sync {
    /// 속성 메타데이터
    fn attributes(&self) -> Vec<AttributeInfo>;

    /// 단일 속성 값 조회
    fn get_attribute(&self, name: &str) -> CollectResult<BeanValue>;
}

/// Bean with a fixed set of attribute values
#[derive(Debug, Clone, Default)]
pub struct StaticBean {
    attributes: Vec<(AttributeInfo, Result<BeanValue, String>)>,
}

impl StaticBean {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an attribute whose declared type is derived from its value
    pub fn with_attribute(self, name: impl Into<String>, value: BeanValue) -> Self {
        let name = name.into();
        let info = AttributeInfo::new(name.clone(), value.type_name(), name);
        self.with_attribute_info(info, value)
    }

    pub fn with_attribute_info(mut self, info: AttributeInfo, value: BeanValue) -> Self {
        self.attributes.push((info, Ok(value)));
        self
    }

    /// Add an attribute whose read always fails
    pub fn with_failing_attribute(
        mut self,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let name = name.into();
        self.attributes.push((
            AttributeInfo::new(name.clone(), "java.lang.Object", name),
            Err(reason.into()),
        ));
        self
    }
}

impl ManagedBean for StaticBean {
    fn attributes(&self) -> Vec<AttributeInfo> {
        self.attributes.iter().map(|(info, _)| info.clone()).collect()
    }

    fn get_attribute(&self, name: &str) -> CollectResult<BeanValue> {
        let (_, value) = self
            .attributes
            .iter()
            .find(|(info, _)| info.name == name)
            .ok_or_else(|| CollectorError::AttributeRead {
                mbean: String::new(),
                attribute: name.to_string(),
                reason: "no such attribute".to_string(),
            })?;

        value.clone().map_err(|reason| CollectorError::AttributeRead {
            mbean: String::new(),
            attribute: name.to_string(),
            reason,
        })
    }
}

/// In-process bean server
#[derive(Default)]
pub struct LocalBeanServer {
    beans: RwLock<BTreeMap<ObjectName, Arc<dyn ManagedBean>>>,
}

impl LocalBeanServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a bean, replacing any bean already registered under `name`
    pub fn register(&self, name: ObjectName, bean: impl ManagedBean + 'static) {
        let mut beans = self.beans.write().unwrap_or_else(|e| e.into_inner());
        beans.insert(name, Arc::new(bean));
    }

    pub fn unregister(&self, name: &ObjectName) -> bool {
        let mut beans = self.beans.write().unwrap_or_else(|e| e.into_inner());
        beans.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.beans.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn bean(&self, name: &ObjectName) -> CollectResult<Arc<dyn ManagedBean>> {
        let beans = self.beans.read().unwrap_or_else(|e| e.into_inner());
        beans
            .get(name)
            .cloned()
            .ok_or_else(|| CollectorError::MBeanNotFound(name.to_string()))
    }
}

#[async_trait]
impl BeanServer for LocalBeanServer {
    async fn query_names(&self, pattern: &ObjectNamePattern) -> CollectResult<Vec<ObjectName>> {
        let beans = self.beans.read().unwrap_or_else(|e| e.into_inner());
        Ok(beans
            .keys()
            .filter(|name| pattern.matches(name))
            .cloned()
            .collect())
    }

    async fn attribute_infos(&self, name: &ObjectName) -> CollectResult<Vec<AttributeInfo>> {
        Ok(self.bean(name)?.attributes())
    }

    async fn get_attributes(
        &self,
        name: &ObjectName,
        attributes: &[AttributeInfo],
    ) -> CollectResult<Vec<(String, BeanValue)>> {
        let bean = self.bean(name)?;

        attributes
            .iter()
            .map(|info| {
                bean.get_attribute(&info.name)
                    .map(|value| (info.name.clone(), value))
                    .map_err(|e| match e {
                        CollectorError::AttributeRead {
                            attribute, reason, ..
                        } => CollectorError::AttributeRead {
                            mbean: name.to_string(),
                            attribute,
                            reason,
                        },
                        other => other,
                    })
            })
            .collect()
    }
}
