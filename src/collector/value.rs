//! MBean 속성 값 모델
//!
//! Attribute values form a closed sum type. Flattening is a structural match
//! over [`BeanValue`], with unsupported shapes as explicit variants.

use std::fmt;

/// Type name reported for composite values
pub const COMPOSITE_TYPE: &str = "javax.management.openmbean.CompositeData";
/// Type name reported for tabular values
pub const TABULAR_TYPE: &str = "javax.management.openmbean.TabularData";

/// 스칼라 값 (leaf)
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    /// 정수
    Integer(i64),
    /// 실수
    Float(f64),
    /// 불리언
    Boolean(bool),
    /// 문자열
    Text(String),
}

impl ScalarValue {
    /// Numeric value of the leaf, booleans as 1.0 / 0.0
    ///
    /// # Precision Warning
    /// When converting `Integer(i64)` to `f64`, precision loss may occur
    /// for values > 2^53 (9,007,199,254,740,992).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScalarValue::Integer(i) => Some(*i as f64),
            ScalarValue::Float(f) => Some(*f),
            ScalarValue::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            ScalarValue::Text(_) => None,
        }
    }

    /// Java-style type name for the leaf
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarValue::Integer(_) => "java.lang.Long",
            ScalarValue::Float(_) => "java.lang.Double",
            ScalarValue::Boolean(_) => "java.lang.Boolean",
            ScalarValue::Text(_) => "java.lang.String",
        }
    }
}

impl fmt::Display for ScalarValue {
    /// Renders the value the way a JVM would stringify it, which is what
    /// rule patterns see after the `: ` separator.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Integer(i) => write!(f, "{}", i),
            ScalarValue::Float(v) if v.is_nan() => f.write_str("NaN"),
            ScalarValue::Float(v) if v.is_infinite() => {
                f.write_str(if *v > 0.0 { "Infinity" } else { "-Infinity" })
            }
            ScalarValue::Float(v) => write!(f, "{:?}", v),
            ScalarValue::Boolean(b) => write!(f, "{}", b),
            ScalarValue::Text(s) => f.write_str(s),
        }
    }
}

/// Composite의 개별 필드
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeField {
    /// 필드 이름
    pub name: String,
    /// 필드 타입 이름
    pub type_name: String,
    /// 필드 값
    pub value: BeanValue,
}

/// 복합 값 (CompositeData)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositeValue {
    /// Composite 타입 설명
    pub description: String,
    /// 필드 목록 (순서 유지)
    pub fields: Vec<CompositeField>,
}

impl CompositeValue {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            fields: Vec::new(),
        }
    }

    /// Add a field, deriving its type name from the value
    pub fn with_field(mut self, name: impl Into<String>, value: BeanValue) -> Self {
        let type_name = value.type_name().to_string();
        self.fields.push(CompositeField {
            name: name.into(),
            type_name,
            value,
        });
        self
    }

    /// Look up a field value by name
    pub fn get(&self, name: &str) -> Option<&BeanValue> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }
}

/// 테이블 값 (TabularData)
///
/// Rows are composites keyed by one or more index fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TabularValue {
    /// Index 필드 이름 목록
    pub index_names: Vec<String>,
    /// 행 목록
    pub rows: Vec<CompositeValue>,
}

impl TabularValue {
    pub fn new<S: Into<String>>(index_names: impl IntoIterator<Item = S>) -> Self {
        Self {
            index_names: index_names.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: CompositeValue) -> Self {
        self.rows.push(row);
        self
    }
}

/// MBean 속성 값
#[derive(Debug, Clone, PartialEq)]
pub enum BeanValue {
    /// Null 값
    Null,
    /// 스칼라 값
    Scalar(ScalarValue),
    /// 복합 객체 (CompositeData)
    Composite(CompositeValue),
    /// 테이블 (TabularData)
    Tabular(TabularValue),
    /// 배열 (지원하지 않음)
    Array(Vec<BeanValue>),
    /// 그 외 타입 (지원하지 않음), 타입 이름 포함
    Unsupported(String),
}

impl BeanValue {
    pub fn integer(i: i64) -> Self {
        BeanValue::Scalar(ScalarValue::Integer(i))
    }

    pub fn float(f: f64) -> Self {
        BeanValue::Scalar(ScalarValue::Float(f))
    }

    pub fn boolean(b: bool) -> Self {
        BeanValue::Scalar(ScalarValue::Boolean(b))
    }

    pub fn text(s: impl Into<String>) -> Self {
        BeanValue::Scalar(ScalarValue::Text(s.into()))
    }

    /// Type name used when no declared type is available
    pub fn type_name(&self) -> &str {
        match self {
            BeanValue::Null => "null",
            BeanValue::Scalar(s) => s.type_name(),
            BeanValue::Composite(_) => COMPOSITE_TYPE,
            BeanValue::Tabular(_) => TABULAR_TYPE,
            BeanValue::Array(_) => "array",
            BeanValue::Unsupported(type_name) => type_name,
        }
    }

    /// Whether flattening can never produce a sample from this value
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BeanValue::Array(_) | BeanValue::Unsupported(_))
    }
}

/// 속성 메타데이터
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    /// 속성 이름
    pub name: String,
    /// 선언된 타입
    pub type_name: String,
    /// 설명
    pub description: String,
    /// 읽기 가능 여부
    pub readable: bool,
}

impl AttributeInfo {
    pub fn new(
        name: impl Into<String>,
        type_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            description: description.into(),
            readable: true,
        }
    }

    pub fn write_only(mut self) -> Self {
        self.readable = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_display() {
        assert_eq!(ScalarValue::Integer(200).to_string(), "200");
        assert_eq!(ScalarValue::Float(1.0).to_string(), "1.0");
        assert_eq!(ScalarValue::Float(0.25).to_string(), "0.25");
        assert_eq!(ScalarValue::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(ScalarValue::Float(f64::NEG_INFINITY).to_string(), "-Infinity");
        assert_eq!(ScalarValue::Boolean(true).to_string(), "true");
        assert_eq!(ScalarValue::Text("abc".into()).to_string(), "abc");
    }

    #[test]
    fn test_scalar_as_f64() {
        assert_eq!(ScalarValue::Integer(7).as_f64(), Some(7.0));
        assert_eq!(ScalarValue::Boolean(true).as_f64(), Some(1.0));
        assert_eq!(ScalarValue::Boolean(false).as_f64(), Some(0.0));
        assert_eq!(ScalarValue::Text("7".into()).as_f64(), None);
    }

    #[test]
    fn test_composite_builder() {
        let composite = CompositeValue::new("memory usage")
            .with_field("used", BeanValue::integer(10))
            .with_field("max", BeanValue::integer(20));
        assert_eq!(composite.fields.len(), 2);
        assert_eq!(composite.get("used"), Some(&BeanValue::integer(10)));
        assert_eq!(composite.fields[0].type_name, "java.lang.Long");
        assert!(composite.get("missing").is_none());
    }

    #[test]
    fn test_unsupported() {
        assert!(BeanValue::Array(vec![]).is_unsupported());
        assert!(BeanValue::Unsupported("java.lang.Object".into()).is_unsupported());
        assert!(!BeanValue::Null.is_unsupported());
        assert!(!BeanValue::integer(1).is_unsupported());
    }
}
