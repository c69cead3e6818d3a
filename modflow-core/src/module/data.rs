//! Units of data moving through couplers, and data requests

use super::ModuleUrn;
use crate::errors::UrnError;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// One unit of data, type-erased
///
/// Cloning is cheap (shared payload). Receivers downcast to the concrete
/// type they understand and reject anything else.
#[derive(Clone)]
pub struct Data {
    payload: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl Data {
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            payload: Arc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.payload.downcast_ref::<T>()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.payload.is::<T>()
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for Data {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Data")
            .field("type", &self.type_name)
            .finish_non_exhaustive()
    }
}

/// One position of a data flow: the module and its optional request parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataRequest {
    pub urn: ModuleUrn,
    pub parameter: Option<String>,
}

impl DataRequest {
    pub fn new(urn: ModuleUrn) -> Self {
        Self {
            urn,
            parameter: None,
        }
    }

    pub fn with_parameter(urn: ModuleUrn, parameter: impl Into<String>) -> Self {
        Self {
            urn,
            parameter: Some(parameter.into()),
        }
    }
}

impl fmt::Display for DataRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.parameter {
            Some(param) => write!(f, "{};{}", self.urn, param.replace('^', "^^")),
            None => write!(f, "{}", self.urn),
        }
    }
}

const REQUEST_DELIMITER: char = '^';
const PARAMETER_DELIMITER: char = ';';

/// Parse the console flow syntax `urn[;parameter]^urn[;parameter]...`
///
/// `^^` stands for a literal `^`. Only the first `;` of a segment separates
/// the URN from its parameter, so parameters may contain `;`.
pub fn parse_flow_requests(text: &str) -> Result<Vec<DataRequest>, UrnError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c == REQUEST_DELIMITER {
            if chars.peek() == Some(&REQUEST_DELIMITER) {
                chars.next();
                current.push(REQUEST_DELIMITER);
            } else {
                segments.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }
    segments.push(current);

    segments
        .iter()
        .map(|segment| match segment.split_once(PARAMETER_DELIMITER) {
            Some((urn, param)) => Ok(DataRequest::with_parameter(
                ModuleUrn::parse(urn.trim())?,
                param,
            )),
            None => Ok(DataRequest::new(ModuleUrn::parse(segment.trim())?)),
        })
        .collect()
}
