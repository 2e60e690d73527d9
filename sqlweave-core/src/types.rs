//! Values, column types and the result/bind processors dialects attach to them.
//!
//! A dialect owns a static [`ColSpecs`] table that maps abstract
//! [`TypeClass`]es to the implementation used for that backend. Looking a
//! type up walks its class and then its parent classes, so a `Float` column
//! falls back to the `Numeric` entry unless the table names `Float` itself.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

use crate::dialect::Dialect;
use crate::error::{DialectError, DialectResult};

/// Scale used when a float column is returned as a decimal without an explicit scale.
pub const DEFAULT_DECIMAL_RETURN_SCALE: u32 = 10;

/// A value as exchanged with the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,
    /// Boolean (BIT).
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// Exact decimal.
    Decimal(Decimal),
    /// Text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
}

impl SqlValue {
    /// Check if the value is NULL.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the value as text, if it is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Decimal(_) => "decimal",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{}", b),
            Self::Int(i) => write!(f, "{}", i),
            Self::Float(x) => write!(f, "{}", x),
            Self::Decimal(d) => write!(f, "{}", d),
            Self::Text(s) => f.write_str(s),
            Self::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
        }
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<Decimal> for SqlValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Converts a value on its way out of (result) or into (bind) the driver.
pub type ResultProcessor = Arc<dyn Fn(SqlValue) -> DialectResult<SqlValue> + Send + Sync>;

/// Converts a parameter value before it is handed to the driver.
pub type BindProcessor = ResultProcessor;

/// Abstract type classes that [`ColSpecs`] tables are keyed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeClass {
    /// Integer types.
    Integer,
    /// Fixed precision numerics.
    Numeric,
    /// Floating point numerics.
    Float,
    /// Character data.
    String,
    /// Binary data.
    Binary,
    /// Booleans.
    Boolean,
}

impl TypeClass {
    /// The class this one specializes, if any.
    pub fn parent(&self) -> Option<Self> {
        match self {
            Self::Float => Some(Self::Numeric),
            _ => None,
        }
    }
}

/// A column type as declared by the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// INTEGER.
    Integer,
    /// NUMERIC / DECIMAL.
    Numeric {
        /// Total digits.
        precision: Option<u32>,
        /// Digits after the decimal point.
        scale: Option<u32>,
        /// Return values as exact decimals instead of floats.
        asdecimal: bool,
    },
    /// FLOAT / REAL.
    Float {
        /// Binary precision.
        precision: Option<u32>,
        /// Return values as exact decimals instead of floats.
        asdecimal: bool,
        /// Scale used when converting to decimal.
        decimal_return_scale: Option<u32>,
    },
    /// Character data.
    String {
        /// Maximum length.
        length: Option<u32>,
    },
    /// Binary data.
    Binary {
        /// Maximum length.
        length: Option<u32>,
    },
    /// BOOLEAN / BIT.
    Boolean,
}

impl SqlType {
    /// NUMERIC returning exact decimals.
    pub fn numeric() -> Self {
        Self::Numeric {
            precision: None,
            scale: None,
            asdecimal: true,
        }
    }

    /// FLOAT returning floats.
    pub fn float() -> Self {
        Self::Float {
            precision: None,
            asdecimal: false,
            decimal_return_scale: None,
        }
    }

    /// Change whether a numeric type returns exact decimals.
    pub fn with_asdecimal(self, asdecimal: bool) -> Self {
        match self {
            Self::Numeric {
                precision, scale, ..
            } => Self::Numeric {
                precision,
                scale,
                asdecimal,
            },
            Self::Float {
                precision,
                decimal_return_scale,
                ..
            } => Self::Float {
                precision,
                asdecimal,
                decimal_return_scale,
            },
            other => other,
        }
    }

    /// Set the scale of a NUMERIC, or the decimal return scale of a FLOAT.
    pub fn with_scale(self, new_scale: u32) -> Self {
        match self {
            Self::Numeric {
                precision,
                asdecimal,
                ..
            } => Self::Numeric {
                precision,
                scale: Some(new_scale),
                asdecimal,
            },
            Self::Float {
                precision,
                asdecimal,
                ..
            } => Self::Float {
                precision,
                asdecimal,
                decimal_return_scale: Some(new_scale),
            },
            other => other,
        }
    }

    /// The class this type is looked up under.
    pub fn type_class(&self) -> TypeClass {
        match self {
            Self::Integer => TypeClass::Integer,
            Self::Numeric { .. } => TypeClass::Numeric,
            Self::Float { .. } => TypeClass::Float,
            Self::String { .. } => TypeClass::String,
            Self::Binary { .. } => TypeClass::Binary,
            Self::Boolean => TypeClass::Boolean,
        }
    }

    /// Whether values of this type are returned as exact decimals.
    pub fn asdecimal(&self) -> bool {
        match self {
            Self::Numeric { asdecimal, .. } | Self::Float { asdecimal, .. } => *asdecimal,
            _ => false,
        }
    }
}

/// A dialect-specific implementation of a column type.
pub trait TypeImpl: fmt::Debug + Send + Sync {
    /// Processor applied to values read from the driver, or `None` to pass them through.
    fn result_processor(&self, _dialect: &dyn Dialect) -> Option<ResultProcessor> {
        None
    }

    /// Processor applied to parameters before they reach the driver.
    fn bind_processor(&self, _dialect: &dyn Dialect) -> Option<BindProcessor> {
        None
    }
}

/// Builds a type implementation from the declared type.
pub type TypeAdapter = fn(&SqlType) -> Box<dyn TypeImpl>;

/// Static mapping from type classes to type implementations.
pub struct ColSpecs {
    entries: &'static [(TypeClass, TypeAdapter)],
    base: Option<&'static ColSpecs>,
}

impl ColSpecs {
    /// A table with no parent.
    pub const fn new(entries: &'static [(TypeClass, TypeAdapter)]) -> Self {
        Self {
            entries,
            base: None,
        }
    }

    /// A table whose entries override those of `base`.
    pub const fn extending(
        base: &'static ColSpecs,
        entries: &'static [(TypeClass, TypeAdapter)],
    ) -> Self {
        Self {
            entries,
            base: Some(base),
        }
    }

    /// Find the adapter registered for exactly this class.
    pub fn lookup(&self, class: TypeClass) -> Option<TypeAdapter> {
        self.entries
            .iter()
            .find(|(c, _)| *c == class)
            .map(|(_, adapter)| *adapter)
            .or_else(|| self.base.and_then(|base| base.lookup(class)))
    }

    /// Resolve the implementation for a declared type.
    pub fn adapt(&self, ty: &SqlType) -> Box<dyn TypeImpl> {
        let mut class = Some(ty.type_class());
        while let Some(c) = class {
            if let Some(adapter) = self.lookup(c) {
                return adapter(ty);
            }
            class = c.parent();
        }
        default_impl(ty)
    }
}

impl fmt::Debug for ColSpecs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let classes: Vec<TypeClass> = self.entries.iter().map(|(c, _)| *c).collect();
        f.debug_struct("ColSpecs")
            .field("classes", &classes)
            .field("base", &self.base)
            .finish()
    }
}

/// Base implementation for a declared type.
pub fn default_impl(ty: &SqlType) -> Box<dyn TypeImpl> {
    match *ty {
        SqlType::Numeric {
            scale, asdecimal, ..
        } => Box::new(NumericType { asdecimal, scale }),
        SqlType::Float {
            asdecimal,
            decimal_return_scale,
            ..
        } => Box::new(FloatType {
            asdecimal,
            decimal_return_scale,
        }),
        SqlType::Binary { .. } => Box::new(BinaryType),
        SqlType::Integer | SqlType::String { .. } | SqlType::Boolean => Box::new(PassThrough),
    }
}

/// Types that need no conversion.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassThrough;

impl TypeImpl for PassThrough {}

/// Base NUMERIC behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericType {
    /// Return exact decimals.
    pub asdecimal: bool,
    /// Scale to quantize decimals to.
    pub scale: Option<u32>,
}

impl NumericType {
    /// Adapter for [`ColSpecs`] tables.
    pub fn adapt(ty: &SqlType) -> Box<dyn TypeImpl> {
        match *ty {
            SqlType::Numeric {
                scale, asdecimal, ..
            } => Box::new(Self { asdecimal, scale }),
            other => default_impl(&other),
        }
    }
}

impl TypeImpl for NumericType {
    fn result_processor(&self, dialect: &dyn Dialect) -> Option<ResultProcessor> {
        if self.asdecimal {
            Some(processors::to_decimal(self.scale))
        } else if dialect.supports_native_decimal() {
            Some(Arc::new(processors::to_float))
        } else {
            None
        }
    }
}

/// Base FLOAT behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatType {
    /// Return exact decimals.
    pub asdecimal: bool,
    /// Scale used for decimal conversion.
    pub decimal_return_scale: Option<u32>,
}

impl FloatType {
    /// Adapter for [`ColSpecs`] tables.
    pub fn adapt(ty: &SqlType) -> Box<dyn TypeImpl> {
        match *ty {
            SqlType::Float {
                asdecimal,
                decimal_return_scale,
                ..
            } => Box::new(Self {
                asdecimal,
                decimal_return_scale,
            }),
            other => default_impl(&other),
        }
    }
}

impl TypeImpl for FloatType {
    fn result_processor(&self, _dialect: &dyn Dialect) -> Option<ResultProcessor> {
        self.asdecimal.then(|| {
            processors::to_decimal(Some(
                self.decimal_return_scale
                    .unwrap_or(DEFAULT_DECIMAL_RETURN_SCALE),
            ))
        })
    }
}

/// Base binary behavior: parameters go through the driver's binary constructor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinaryType;

impl TypeImpl for BinaryType {
    fn bind_processor(&self, dialect: &dyn Dialect) -> Option<BindProcessor> {
        let dbapi = dialect.dbapi();
        Some(Arc::new(move |value| {
            if value.is_null() {
                Ok(value)
            } else {
                Ok(dbapi.binary(value))
            }
        }))
    }
}

/// Stock value converters.
pub mod processors {
    use super::*;

    /// Coerce a value to a float. NULL passes through.
    pub fn to_float(value: SqlValue) -> DialectResult<SqlValue> {
        let f = match value {
            SqlValue::Null => return Ok(SqlValue::Null),
            SqlValue::Float(f) => f,
            SqlValue::Int(i) => i as f64,
            SqlValue::Bool(b) => f64::from(u8::from(b)),
            SqlValue::Decimal(ref d) => d.to_f64().ok_or_else(|| {
                DialectError::conversion(format!("decimal {} does not fit a float", d))
            })?,
            SqlValue::Text(ref s) => s.trim().parse().map_err(|_| {
                DialectError::conversion(format!("could not convert '{}' to float", s))
            })?,
            SqlValue::Bytes(_) => {
                return Err(DialectError::conversion(
                    "could not convert bytes to float",
                ));
            }
        };
        Ok(SqlValue::Float(f))
    }

    /// Build a processor that coerces values to exact decimals, rescaled to `scale` if given.
    pub fn to_decimal(scale: Option<u32>) -> ResultProcessor {
        Arc::new(move |value| {
            let mut d = match value {
                SqlValue::Null => return Ok(SqlValue::Null),
                SqlValue::Decimal(d) => d,
                SqlValue::Int(i) => Decimal::from(i),
                SqlValue::Bool(b) => Decimal::from(u8::from(b)),
                SqlValue::Float(f) => {
                    let text = match scale {
                        Some(scale) => format!("{:.*}", scale as usize, f),
                        None => f.to_string(),
                    };
                    parse_decimal(&text)?
                }
                SqlValue::Text(ref s) => parse_decimal(s)?,
                SqlValue::Bytes(_) => {
                    return Err(DialectError::conversion(
                        "could not convert bytes to decimal",
                    ));
                }
            };
            if let Some(scale) = scale {
                d.rescale(scale);
            }
            Ok(SqlValue::Decimal(d))
        })
    }

    fn parse_decimal(text: &str) -> DialectResult<Decimal> {
        let text = text.trim();
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map_err(|_| DialectError::conversion(format!("could not convert '{}' to decimal", text)))
    }
}
