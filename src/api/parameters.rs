use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::api::identifier::{decode_identifier, encode_identifier};
use crate::api::image::{OutputFormat, Quality, Region, Rotation};
use crate::api::query::Query;
use crate::error::IiifError;
use crate::geometry::Dimension;
use crate::operation::{Encode, Operation, OperationList, Scale};

/// The size URI component of one Image API version.
pub trait SizeComponent:
    FromStr<Err = IiifError> + fmt::Display + fmt::Debug + Clone + PartialEq
{
    /// Whether the size leaves the region at its own size, making a scale
    /// operation redundant.
    fn is_identity(&self) -> bool;

    /// Whether the size asks for the largest image the server allows.
    fn is_max(&self) -> bool;

    fn is_upscaling_allowed(&self) -> bool;

    fn to_scale(&self, max_scale: f64) -> Scale;

    fn to_canonical_string(&self, full_size: &Dimension) -> String;
}

/// A parsed and validated image request.
///
/// Instances are only obtained through [`Parameters::new`] or [`FromStr`], so
/// every field satisfies its own invariants.
#[derive(Clone, Debug)]
pub struct Parameters<S> {
    identifier: String,
    region: Region,
    size: S,
    rotation: Rotation,
    quality: Quality,
    output_format: OutputFormat,
    query: Query,
}

impl<S: SizeComponent> Parameters<S> {
    /// Builds parameters from the raw path components. `identifier` is taken
    /// as already decoded.
    pub fn new(
        identifier: impl Into<String>,
        region: &str,
        size: &str,
        rotation: &str,
        quality: &str,
        format: &str,
    ) -> Result<Self, IiifError> {
        Ok(Self {
            identifier: identifier.into(),
            region: region.parse()?,
            size: size.parse()?,
            rotation: rotation.parse()?,
            quality: quality.parse()?,
            output_format: format.parse()?,
            query: Query::new(),
        })
    }

    /// A copy addressing a different identifier.
    pub fn with_identifier(&self, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..self.clone()
        }
    }

    pub fn with_query(mut self, query: Query) -> Self {
        self.query = query;
        self
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn size(&self) -> &S {
        &self.size
    }

    pub fn rotation(&self) -> &Rotation {
        &self.rotation
    }

    pub fn quality(&self) -> Quality {
        self.quality
    }

    pub fn output_format(&self) -> OutputFormat {
        self.output_format
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Compiles the request into operations in processing order: crop,
    /// scale, transpose, rotate, color transform, encode.
    pub fn to_operation_list(&self, max_scale: f64) -> OperationList {
        let mut ops = OperationList::new(self.identifier.clone());
        if !self.region.is_full() {
            ops.push(Operation::Crop(self.region.to_crop()));
        }
        if !self.size.is_identity() {
            ops.push(Operation::Scale(self.size.to_scale(max_scale)));
        }
        if let Some(transpose) = self.rotation.to_transpose() {
            ops.push(Operation::Transpose(transpose));
        }
        if !self.rotation.is_zero() {
            ops.push(Operation::Rotate(self.rotation.to_rotate()));
        }
        if let Some(transform) = self.quality.to_color_transform() {
            ops.push(Operation::ColorTransform(transform));
        }
        ops.push(Operation::Encode(Encode::new(self.output_format.to_format())));
        for (key, value) in self.query.iter() {
            ops.insert_option(key, value);
        }
        ops
    }

    pub fn to_canonical_string(&self, full_size: &Dimension) -> String {
        let mut uri = format!(
            "{}/{}/{}/{}/{}.{}",
            encode_identifier(&self.identifier),
            self.region.to_canonical_string(full_size),
            self.size.to_canonical_string(full_size),
            self.rotation.to_canonical_string(),
            self.quality,
            self.output_format,
        );
        if !self.query.is_empty() {
            uri.push('?');
            uri.push_str(&self.query.to_string());
        }
        uri
    }
}

impl<S: SizeComponent> fmt::Display for Parameters<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}/{}.{}",
            encode_identifier(&self.identifier),
            self.region,
            self.size,
            self.rotation,
            self.quality,
            self.output_format,
        )?;
        if !self.query.is_empty() {
            write!(f, "?{}", self.query)?;
        }
        Ok(())
    }
}

/// Parses `identifier/region/size/rotation/quality.format[?query]`.
impl<S: SizeComponent> FromStr for Parameters<S> {
    type Err = IiifError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Query::from(query)),
            None => (s, Query::new()),
        };
        let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let [identifier, region, size, rotation, quality_format] = parts[..] else {
            return Err(IiifError::invalid(format!("Invalid request path: {path}")));
        };
        let (quality, format) = quality_format
            .rsplit_once('.')
            .filter(|(q, f)| !q.is_empty() && !f.is_empty())
            .ok_or_else(|| {
                IiifError::invalid(format!(
                    "Invalid quality and format: {quality_format}"
                ))
            })?;
        let identifier = decode_identifier(identifier)?;
        Ok(Self::new(identifier, region, size, rotation, quality, format)?
            .with_query(query))
    }
}

impl<S: SizeComponent> PartialEq for Parameters<S> {
    fn eq(&self, other: &Self) -> bool {
        self.to_string() == other.to_string()
    }
}

impl<S: SizeComponent> Eq for Parameters<S> {}

impl<S: SizeComponent> Hash for Parameters<S> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.to_string().hash(state);
    }
}
