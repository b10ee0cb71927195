//! Jolokia JSON 응답 파서
//!
//! Jolokia API 응답을 파싱하여 내부 데이터 구조로 변환합니다.

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::error::CollectorError;

use super::value::{
    AttributeInfo, BeanValue, CompositeField, CompositeValue, ScalarValue, TabularValue,
    COMPOSITE_TYPE,
};

/// Collector 작업 결과 타입
pub type CollectResult<T> = Result<T, CollectorError>;

/// Index field name used for tabular rows reconstructed from Jolokia maps
pub const TABULAR_INDEX_KEY: &str = "key";

/// Jolokia API 응답 구조체
#[derive(Debug, Clone)]
pub struct JolokiaResponse {
    /// 요청 정보
    pub request: RequestInfo,
    /// 응답 값 (원본 JSON)
    pub value: Value,
    /// 응답 상태 코드
    pub status: u16,
    /// 타임스탬프 (Unix epoch)
    pub timestamp: u64,
    /// 에러 메시지 (실패 시)
    pub error: Option<String>,
    /// 에러 타입 (실패 시)
    pub error_type: Option<String>,
}

impl JolokiaResponse {
    /// 성공 응답인지 확인
    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// Convert a non-200 body into an error
    pub fn into_result(self) -> CollectResult<Value> {
        if self.is_success() {
            return Ok(self.value);
        }

        let message = self
            .error
            .unwrap_or_else(|| "unknown Jolokia error".to_string());
        match self.error_type.as_deref() {
            Some("javax.management.InstanceNotFoundException") => Err(
                CollectorError::MBeanNotFound(self.request.mbean.unwrap_or(message)),
            ),
            _ => Err(CollectorError::JolokiaError {
                status: self.status,
                message,
            }),
        }
    }
}

/// 요청 정보
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestInfo {
    /// MBean ObjectName
    #[serde(default)]
    pub mbean: Option<String>,
    /// 조회한 속성 (단일 또는 복수)
    #[serde(default)]
    pub attribute: Option<Value>,
    /// 요청 타입
    #[serde(rename = "type", default)]
    pub request_type: String,
}

/// 내부 파싱용 구조체
#[derive(Deserialize)]
struct RawJolokiaResponse {
    #[serde(default)]
    request: RequestInfo,
    #[serde(default)]
    value: Value,
    status: u16,
    #[serde(default)]
    timestamp: u64,
    error: Option<String>,
    error_type: Option<String>,
}

/// 단일 응답 파싱
pub fn parse_response(json: &str) -> CollectResult<JolokiaResponse> {
    let raw: RawJolokiaResponse =
        serde_json::from_str(json).map_err(|e| CollectorError::JsonParse(e.to_string()))?;

    Ok(JolokiaResponse {
        request: raw.request,
        value: raw.value,
        status: raw.status,
        timestamp: raw.timestamp,
        error: raw.error,
        error_type: raw.error_type,
    })
}

/// search 응답 값에서 ObjectName 목록 추출
pub fn parse_search_value(value: Value) -> CollectResult<Vec<String>> {
    match value {
        Value::Array(items) => Ok(items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s),
                _ => None,
            })
            .collect()),
        Value::Null => Ok(Vec::new()),
        other => Err(CollectorError::JsonParse(format!(
            "search value must be an array, got {}",
            other
        ))),
    }
}

/// list 응답 값에서 속성 메타데이터 추출
///
/// Expects the MBean-level list format: `{"attr": {"Name": {"type": .., "desc": .., "rw": ..}}}`.
pub fn parse_attribute_list(value: &Value) -> CollectResult<Vec<AttributeInfo>> {
    let attrs = match value.get("attr") {
        Some(Value::Object(attrs)) => attrs,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(CollectorError::JsonParse(format!(
                "list 'attr' must be an object, got {}",
                other
            )))
        }
    };

    Ok(attrs
        .iter()
        .map(|(name, meta)| {
            let text = |key: &str| {
                meta.get(key)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            AttributeInfo::new(name.clone(), text("type"), text("desc"))
        })
        .collect())
}

/// JSON 값을 BeanValue로 변환
///
/// The declared attribute type decides between composite and tabular
/// interpretations of a JSON object, since Jolokia serializes both as maps.
pub fn bean_value_from_json(value: Value, declared_type: &str) -> BeanValue {
    match value {
        Value::Null => BeanValue::Null,
        Value::Bool(b) => BeanValue::Scalar(ScalarValue::Boolean(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => BeanValue::Scalar(ScalarValue::Integer(i)),
            None => match n.as_f64() {
                Some(f) => BeanValue::Scalar(ScalarValue::Float(f)),
                None => BeanValue::Unsupported(format!("number {}", n)),
            },
        },
        Value::String(s) => BeanValue::Scalar(ScalarValue::Text(s)),
        Value::Array(items) => BeanValue::Array(
            items
                .into_iter()
                .map(|v| bean_value_from_json(v, ""))
                .collect(),
        ),
        Value::Object(map) if declared_type.contains("TabularData") => tabular_from_json(map),
        Value::Object(map) => BeanValue::Composite(composite_from_json(map)),
    }
}

fn composite_from_json(map: Map<String, Value>) -> CompositeValue {
    let fields = map
        .into_iter()
        .map(|(name, v)| {
            let value = nested_value_from_json(v);
            CompositeField {
                name,
                type_name: value.type_name().to_string(),
                value,
            }
        })
        .collect();

    CompositeValue {
        description: COMPOSITE_TYPE.to_string(),
        fields,
    }
}

/// Convert a value nested inside a composite or tabular row.
///
/// Nested values carry no declared type, so a map of two or more objects
/// sharing one field set is read as Jolokia's tabular serialization.
fn nested_value_from_json(value: Value) -> BeanValue {
    match value {
        Value::Object(map) if looks_tabular(&map) => tabular_from_json(map),
        other => bean_value_from_json(other, ""),
    }
}

fn looks_tabular(map: &Map<String, Value>) -> bool {
    let mut rows = map.values().map(Value::as_object);
    let Some(Some(first)) = rows.next() else {
        return false;
    };
    map.len() >= 2
        && !first.is_empty()
        && rows.all(|row| {
            row.is_some_and(|row| {
                row.len() == first.len() && row.keys().all(|k| first.contains_key(k))
            })
        })
}

/// Rebuild tabular rows from Jolokia's `{index: row}` map serialization.
///
/// Each entry becomes a row with a `key` index field. Object rows keep their
/// own fields; scalar rows carry a single `value` field.
fn tabular_from_json(map: Map<String, Value>) -> BeanValue {
    let mut table = TabularValue::new([TABULAR_INDEX_KEY]);

    for (key, row) in map {
        let index = CompositeField {
            name: TABULAR_INDEX_KEY.to_string(),
            type_name: "java.lang.String".to_string(),
            value: BeanValue::text(key),
        };
        let mut composite = match row {
            Value::Object(fields) => {
                let mut composite = composite_from_json(fields);
                composite.fields.retain(|f| f.name != TABULAR_INDEX_KEY);
                composite
            }
            other => CompositeValue::new(COMPOSITE_TYPE).with_field("value", bean_value_from_json(other, "")),
        };
        composite.fields.insert(0, index);
        table.rows.push(composite);
    }

    BeanValue::Tabular(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_simple_number_response() {
        let json = r#"{
            "request": {
                "mbean": "java.lang:type=Threading",
                "attribute": "ThreadCount",
                "type": "read"
            },
            "value": 42,
            "timestamp": 1609459200,
            "status": 200
        }"#;

        let response = parse_response(json).unwrap();
        assert!(response.is_success());
        assert_eq!(response.value, json!(42));
        assert_eq!(
            response.request.mbean.as_deref(),
            Some("java.lang:type=Threading")
        );
    }

    #[test]
    fn test_parse_error_response() {
        let json = r#"{
            "request": {
                "mbean": "invalid:type=NotFound",
                "type": "read"
            },
            "error_type": "javax.management.InstanceNotFoundException",
            "error": "No MBean found",
            "status": 404
        }"#;

        let response = parse_response(json).unwrap();
        assert_eq!(response.status, 404);
        assert!(response.error.is_some());
        assert!(matches!(
            response.into_result(),
            Err(CollectorError::MBeanNotFound(name)) if name == "invalid:type=NotFound"
        ));
    }

    #[test]
    fn test_parse_generic_error_response() {
        let json = r#"{"error": "boom", "error_type": "java.lang.Exception", "status": 500}"#;
        let response = parse_response(json).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(CollectorError::JolokiaError { status: 500, .. })
        ));
    }

    #[test]
    fn test_parse_invalid_json() {
        assert!(matches!(
            parse_response("not json"),
            Err(CollectorError::JsonParse(_))
        ));
    }

    #[test]
    fn test_parse_search_value() {
        let names = parse_search_value(json!(["a:b=c", "d:e=f"])).unwrap();
        assert_eq!(names, vec!["a:b=c", "d:e=f"]);
        assert!(parse_search_value(json!({"x": 1})).is_err());
    }

    #[test]
    fn test_parse_attribute_list() {
        let value = json!({
            "desc": "Information on the management interface of the MBean",
            "attr": {
                "HeapMemoryUsage": {
                    "type": "javax.management.openmbean.CompositeData",
                    "desc": "HeapMemoryUsage",
                    "rw": false
                },
                "Verbose": {"type": "boolean", "desc": "Verbose", "rw": true}
            }
        });

        let infos = parse_attribute_list(&value).unwrap();
        assert_eq!(infos.len(), 2);
        let heap = infos.iter().find(|i| i.name == "HeapMemoryUsage").unwrap();
        assert_eq!(heap.type_name, COMPOSITE_TYPE);
        assert!(heap.readable);
    }

    #[test]
    fn test_bean_value_scalars() {
        assert_eq!(bean_value_from_json(json!(42), ""), BeanValue::integer(42));
        assert_eq!(bean_value_from_json(json!(0.5), ""), BeanValue::float(0.5));
        assert_eq!(bean_value_from_json(json!(true), ""), BeanValue::boolean(true));
        assert_eq!(bean_value_from_json(json!("x"), ""), BeanValue::text("x"));
        assert_eq!(bean_value_from_json(Value::Null, ""), BeanValue::Null);
        assert!(matches!(
            bean_value_from_json(json!([1, 2]), ""),
            BeanValue::Array(items) if items.len() == 2
        ));
    }

    #[test]
    fn test_bean_value_composite() {
        let value = bean_value_from_json(json!({"used": 1000, "max": 2000}), COMPOSITE_TYPE);
        match value {
            BeanValue::Composite(c) => {
                assert_eq!(c.get("used"), Some(&BeanValue::integer(1000)));
                assert_eq!(c.get("max"), Some(&BeanValue::integer(2000)));
            }
            other => panic!("Expected Composite value, got {:?}", other),
        }
    }

    #[test]
    fn test_bean_value_tabular_scalar_rows() {
        let value = bean_value_from_json(
            json!({"java.version": "17", "user.dir": "/opt"}),
            "javax.management.openmbean.TabularData",
        );
        match value {
            BeanValue::Tabular(t) => {
                assert_eq!(t.index_names, vec!["key"]);
                assert_eq!(t.rows.len(), 2);
                let row = &t.rows[0];
                assert_eq!(row.get("key"), Some(&BeanValue::text("java.version")));
                assert_eq!(row.get("value"), Some(&BeanValue::text("17")));
            }
            other => panic!("Expected Tabular value, got {:?}", other),
        }
    }

    #[test]
    fn test_bean_value_tabular_object_rows() {
        let value = bean_value_from_json(
            json!({"/dev/sda1": {"size": 7516192768_i64, "pcent": 2}}),
            "javax.management.openmbean.TabularData",
        );
        match value {
            BeanValue::Tabular(t) => {
                let row = &t.rows[0];
                assert_eq!(row.get("key"), Some(&BeanValue::text("/dev/sda1")));
                assert_eq!(row.get("size"), Some(&BeanValue::integer(7516192768)));
                assert_eq!(row.fields.len(), 3);
            }
            other => panic!("Expected Tabular value, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_table_in_composite() {
        let value = bean_value_from_json(
            json!({
                "duration": 5,
                "memoryUsageAfterGc": {
                    "G1 Eden Space": {"used": 0, "max": 10},
                    "G1 Old Gen": {"used": 3, "max": 20}
                }
            }),
            COMPOSITE_TYPE,
        );
        let BeanValue::Composite(gc_info) = value else {
            panic!("Expected Composite value");
        };
        assert_eq!(gc_info.get("duration"), Some(&BeanValue::integer(5)));

        match gc_info.get("memoryUsageAfterGc") {
            Some(BeanValue::Tabular(t)) => {
                assert_eq!(t.index_names, vec!["key"]);
                assert_eq!(t.rows.len(), 2);
                let old_gen = t
                    .rows
                    .iter()
                    .find(|row| row.get("key") == Some(&BeanValue::text("G1 Old Gen")))
                    .unwrap();
                assert_eq!(old_gen.get("used"), Some(&BeanValue::integer(3)));
            }
            other => panic!("Expected Tabular value, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_table_in_table_row() {
        let value = bean_value_from_json(
            json!({
                "a": {
                    "inner": {
                        "b": {"count": 1},
                        "c": {"count": 2}
                    }
                }
            }),
            "javax.management.openmbean.TabularData",
        );
        let BeanValue::Tabular(outer) = value else {
            panic!("Expected Tabular value");
        };
        match outer.rows[0].get("inner") {
            Some(BeanValue::Tabular(inner)) => assert_eq!(inner.rows.len(), 2),
            other => panic!("Expected Tabular value, got {:?}", other),
        }
    }

    #[test]
    fn test_nested_objects_stay_composite() {
        // Differing field sets, and a single entry, are composites
        let value = bean_value_from_json(
            json!({
                "shapes": {"before": {"used": 1}, "after": {"used": 2, "max": 3}},
                "single": {"only": {"used": 1}}
            }),
            COMPOSITE_TYPE,
        );
        let BeanValue::Composite(c) = value else {
            panic!("Expected Composite value");
        };
        assert!(matches!(c.get("shapes"), Some(BeanValue::Composite(_))));
        assert!(matches!(c.get("single"), Some(BeanValue::Composite(_))));
    }
}
