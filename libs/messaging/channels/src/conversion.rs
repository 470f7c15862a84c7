//! Payload datatypes and conversion
//!
//! Channels may declare the payload types they accept. A payload whose type
//! matches none of them is handed to a [`ConversionService`], which is asked
//! for each declared type in order.

use crate::{BoxError, Payload};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Runtime description of a payload type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Datatype {
    id: TypeId,
    name: &'static str,
}

impl Datatype {
    pub fn of<T: Any>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True if the payload's concrete type is exactly this datatype
    pub fn matches(&self, payload: &Payload) -> bool {
        payload.value_type_id() == self.id
    }
}

impl fmt::Display for Datatype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Converts payloads between types
pub trait ConversionService: Send + Sync + fmt::Debug {
    fn can_convert(&self, source: &Payload, target: &Datatype) -> bool;

    fn convert(&self, source: &Payload, target: &Datatype) -> Result<Payload, BoxError>;
}

type Converter = Arc<dyn Fn(&Payload) -> Result<Payload, BoxError> + Send + Sync>;

/// Conversion service backed by converters registered per (source, target) pair
pub struct DefaultConversionService {
    converters: RwLock<HashMap<(TypeId, TypeId), Converter>>,
}

impl DefaultConversionService {
    /// Create an empty service
    pub fn new() -> Self {
        Self {
            converters: RwLock::new(HashMap::new()),
        }
    }

    /// Create a service with text and number conversions registered
    pub fn with_defaults() -> Self {
        let service = Self::new();
        service.register(|s: &String| Ok(s.trim().parse::<i64>()?));
        service.register(|s: &String| Ok(s.trim().parse::<f64>()?));
        service.register(|s: &String| Ok(s.trim().parse::<bool>()?));
        service.register(|s: &&'static str| Ok(s.to_string()));
        service.register(|s: &&'static str| Ok(s.trim().parse::<i64>()?));
        service.register(|n: &i64| Ok(n.to_string()));
        service.register(|n: &i32| Ok(i64::from(*n)));
        service.register(|n: &f64| Ok(n.to_string()));
        service.register(|b: &bool| Ok(b.to_string()));
        service
    }

    /// Register a converter from `S` to `T`, replacing any previous one
    pub fn register<S, T, F>(&self, convert: F)
    where
        S: Any + Send + Sync,
        T: Any + Send + Sync,
        F: Fn(&S) -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let converter: Converter = Arc::new(move |payload: &Payload| {
            let source = payload.downcast_ref::<S>().ok_or_else(|| {
                BoxError::from(format!(
                    "expected payload of type {}, found {}",
                    std::any::type_name::<S>(),
                    payload.type_name()
                ))
            })?;
            convert(source).map(Payload::new)
        });
        self.converters
            .write()
            .insert((TypeId::of::<S>(), TypeId::of::<T>()), converter);
    }

    pub fn converter_count(&self) -> usize {
        self.converters.read().len()
    }
}

impl Default for DefaultConversionService {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for DefaultConversionService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultConversionService")
            .field("converters", &self.converter_count())
            .finish()
    }
}

impl ConversionService for DefaultConversionService {
    fn can_convert(&self, source: &Payload, target: &Datatype) -> bool {
        self.converters
            .read()
            .contains_key(&(source.value_type_id(), target.type_id()))
    }

    fn convert(&self, source: &Payload, target: &Datatype) -> Result<Payload, BoxError> {
        let converter = self
            .converters
            .read()
            .get(&(source.value_type_id(), target.type_id()))
            .cloned()
            .ok_or_else(|| {
                BoxError::from(format!(
                    "no converter from {} to {}",
                    source.type_name(),
                    target
                ))
            })?;
        converter(source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datatype_matches_exact_type_only() {
        let payload = Payload::new(42i64);
        assert!(Datatype::of::<i64>().matches(&payload));
        assert!(!Datatype::of::<i32>().matches(&payload));
        assert_eq!(Datatype::of::<i64>().to_string(), "i64");
    }

    #[test]
    fn test_default_string_to_number() {
        let service = DefaultConversionService::with_defaults();
        let payload = Payload::new(" 42 ".to_string());
        let target = Datatype::of::<i64>();

        assert!(service.can_convert(&payload, &target));
        let converted = service.convert(&payload, &target).unwrap();
        assert_eq!(converted.downcast_ref::<i64>(), Some(&42));
    }

    #[test]
    fn test_failed_conversion_reports_error() {
        let service = DefaultConversionService::with_defaults();
        let payload = Payload::new("not a number".to_string());

        assert!(service.can_convert(&payload, &Datatype::of::<i64>()));
        assert!(service.convert(&payload, &Datatype::of::<i64>()).is_err());
    }

    #[test]
    fn test_custom_converter() {
        #[derive(Debug, PartialEq)]
        struct Celsius(f64);

        let service = DefaultConversionService::new();
        service.register(|f: &f64| Ok(Celsius((*f - 32.0) * 5.0 / 9.0)));

        let converted = service
            .convert(&Payload::new(212.0f64), &Datatype::of::<Celsius>())
            .unwrap();
        assert_eq!(converted.downcast_ref::<Celsius>(), Some(&Celsius(100.0)));
        assert!(!service.can_convert(&Payload::new(1i64), &Datatype::of::<Celsius>()));
    }
}
