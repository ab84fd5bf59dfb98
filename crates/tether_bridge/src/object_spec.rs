//! # Object Spec
//!
//! The JSON payload of `makeObject`. Field names are short because one spec
//! goes out per created object and a scene may create thousands.
//!
//! ```text
//! {"cH":"150","cN":"M42","cC":true,"wTA":false,"type":"primitiveCube",
//!  "cs":"Spinner","c":[1,0,0],"a":1,"s":[1,1,1],"r":[0,0,0,1],"t":[0,2,0]}
//! ```
//!
//! The handle is written as a decimal string and read back from either a
//! string or a number, under `cH` or `id`.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize, Serializer};

use tether_shared::{ObjectHandle, Quaternion, Transform, Vec3};

use crate::error::DecodeError;

/// Creation request for one render-side object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectSpec {
    /// Handle the object will be known by.
    #[serde(rename = "cH", alias = "id", with = "handle_as_string")]
    pub handle: ObjectHandle,
    /// Model-side name of the object, for diagnostics.
    #[serde(rename = "cN", default, skip_serializing_if = "String::is_empty")]
    pub model_name: String,
    /// Whether the model side waits for `objectCreated`.
    #[serde(rename = "cC", default)]
    pub confirm_creation: bool,
    /// Keep the object hidden until its first geometry update.
    #[serde(rename = "wTA", default)]
    pub wait_to_activate: bool,
    /// Prefab or primitive name.
    #[serde(rename = "type")]
    pub kind: String,
    /// Comma-separated component names.
    #[serde(rename = "cs", default, skip_serializing_if = "String::is_empty")]
    pub components: String,
    /// RGB color for recolorable primitives.
    #[serde(rename = "c", default, skip_serializing_if = "Option::is_none")]
    pub color: Option<[f32; 3]>,
    /// Alpha for recolorable primitives.
    #[serde(rename = "a", default = "opaque")]
    pub alpha: f32,
    /// Initial local scale.
    #[serde(rename = "s", default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<[f32; 3]>,
    /// Initial local rotation, `x, y, z, w`.
    #[serde(rename = "r", default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<[f32; 4]>,
    /// Initial local translation.
    #[serde(rename = "t", default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<[f32; 3]>,
}

const fn opaque() -> f32 {
    1.0
}

impl ObjectSpec {
    /// A spec with no components, colour or transform.
    #[must_use]
    pub fn new(handle: ObjectHandle, kind: impl Into<String>) -> Self {
        Self {
            handle,
            model_name: String::new(),
            confirm_creation: false,
            wait_to_activate: false,
            kind: kind.into(),
            components: String::new(),
            color: None,
            alpha: opaque(),
            scale: None,
            rotation: None,
            translation: None,
        }
    }

    /// Sets the initial transform.
    #[must_use]
    pub const fn with_transform(mut self, transform: Transform) -> Self {
        self.scale = Some(transform.scale.to_array());
        self.rotation = Some(transform.rotation.to_array());
        self.translation = Some(transform.translation.to_array());
        self
    }

    /// Asks the render side to acknowledge creation.
    #[must_use]
    pub const fn confirmed(mut self) -> Self {
        self.confirm_creation = true;
        self
    }

    /// Appends component names to the comma-separated list.
    #[must_use]
    pub fn with_components<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            let name = name.as_ref().trim();
            if name.is_empty() {
                continue;
            }
            if !self.components.is_empty() {
                self.components.push(',');
            }
            self.components.push_str(name);
        }
        self
    }

    /// Component names, empty entries dropped.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// True for engine primitives, which accept any colour.
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        self.kind.starts_with("primitive")
    }

    /// Initial transform, identity for anything left out. Rotation is
    /// normalized since it may have been sent with reduced precision.
    #[must_use]
    pub fn initial_transform(&self) -> Transform {
        Transform::new(
            self.scale.map_or(Vec3::ONE, Vec3::from_array),
            self.rotation
                .map_or(Quaternion::IDENTITY, |r| Quaternion::from_array(r).normalize()),
            self.translation.map_or(Vec3::ZERO, Vec3::from_array),
        )
    }

    /// Encodes as the `makeObject` argument.
    pub fn to_json(&self) -> Result<String, DecodeError> {
        serde_json::to_string(self).map_err(|err| DecodeError::InvalidObjectSpec(err.to_string()))
    }

    /// Decodes a `makeObject` argument.
    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(|err| DecodeError::InvalidObjectSpec(err.to_string()))
    }
}

mod handle_as_string {
    use super::{de, Deserialize, Deserializer, ObjectHandle, Serializer};

    pub fn serialize<S: Serializer>(handle: &ObjectHandle, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(handle)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ObjectHandle, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u32),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(ObjectHandle(n)),
            Raw::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_uses_short_names() {
        let spec = ObjectSpec::new(ObjectHandle(150), "primitiveCube")
            .confirmed()
            .with_components(["Spinner", "", "Glow"]);
        let json = spec.to_json().unwrap();
        assert!(json.contains(r#""cH":"150""#));
        assert!(json.contains(r#""cC":true"#));
        assert!(json.contains(r#""type":"primitiveCube""#));
        assert!(json.contains(r#""cs":"Spinner,Glow""#));
        assert!(!json.contains(r#""t":"#));
        assert_eq!(ObjectSpec::from_json(&json).unwrap(), spec);
    }

    #[test]
    fn test_accepts_numeric_id_alias() {
        let spec = ObjectSpec::from_json(r#"{"id":7,"type":"ship","t":[1,2,3]}"#).unwrap();
        assert_eq!(spec.handle, ObjectHandle(7));
        assert!(!spec.confirm_creation);
        assert!((spec.alpha - 1.0).abs() < f32::EPSILON);
        let transform = spec.initial_transform();
        assert_eq!(transform.translation, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::ONE);
        assert_eq!(transform.rotation, Quaternion::IDENTITY);
    }

    #[test]
    fn test_rotation_is_normalized() {
        let spec = ObjectSpec::from_json(r#"{"cH":"9","type":"x","r":[0,0,0,2]}"#).unwrap();
        assert!(spec
            .initial_transform()
            .rotation
            .approx_eq(Quaternion::IDENTITY, 1e-6));
    }

    #[test]
    fn test_components_and_primitive() {
        let spec = ObjectSpec::from_json(r#"{"cH":"9","type":"primitiveSphere","cs":"A, B,"}"#).unwrap();
        assert_eq!(spec.component_names().collect::<Vec<_>>(), vec!["A", "B"]);
        assert!(spec.is_primitive());
    }

    #[test]
    fn test_bad_json_is_decode_error() {
        assert!(matches!(
            ObjectSpec::from_json("{not json"),
            Err(DecodeError::InvalidObjectSpec(_))
        ));
        assert!(matches!(
            ObjectSpec::from_json(r#"{"cH":"abc","type":"x"}"#),
            Err(DecodeError::InvalidObjectSpec(_))
        ));
    }
}
