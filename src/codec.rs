// =============================================================================
// FEDREC CORE — codec.rs
// FeatureCodec — raw user attributes → fixed-order 10-element feature vector
// =============================================================================
//
// Contract shared by training and inference:
//   [device_id, os_id, gender_id, age,
//    scaled_app_usage_time, scaled_screen_time, scaled_battery_drain,
//    scaled_apps_installed, scaled_data_usage, behavior_class]
//
// The min-max scaler is never refit here. Its persisted scale_/min_ arrays
// are replayed as `x * scale_ + min_` over the six fields it was fitted on,
// in SCALED_FIELDS order. Age is part of that fit, but the vector carries
// raw age at index 3 and only the first five scaled values.
//
// Unseen categories map to id 0, which is also a legal id in a table.
// `FeatureMapping::validate` reports tables where that collision exists.
// =============================================================================

use crate::constants::{FEATURE_COUNT, FEATURE_ORDER, SCALED_FIELDS, UNKNOWN_CATEGORY_ID};
use crate::error::CodecError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

// -----------------------------------------------------------------------------
// Persisted mapping
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    #[serde(rename = "scale_")]
    pub scale: Vec<f64>,
    #[serde(rename = "min_")]
    pub min: Vec<f64>,
}

impl ScalerParams {
    fn check(&self) -> Result<(), CodecError> {
        let n = SCALED_FIELDS.len();
        if self.scale.len() != n || self.min.len() != n {
            return Err(CodecError::InvalidMapping(format!(
                "scaler_params needs {} values each, got scale_={} min_={}",
                n, self.scale.len(), self.min.len())));
        }
        Ok(())
    }

    /// Same arithmetic as the fitted scaler's transform: multiply, then add.
    fn transform(&self, raw: &[f64; 6]) -> [f64; 6] {
        let mut out = [0.0; 6];
        for j in 0..6 {
            out[j] = raw[j] * self.scale[j] + self.min[j];
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMapping {
    pub device_mapping: HashMap<String, u32>,
    pub os_mapping: HashMap<String, u32>,
    pub gender_mapping: HashMap<String, u32>,
    pub scaler_params: ScalerParams,
}

impl FeatureMapping {
    pub fn from_json(text: &str) -> Result<Self, CodecError> {
        let mapping: FeatureMapping = serde_json::from_str(text)?;
        for warning in mapping.validate()? {
            log::warn!("⚠️ feature mapping: {}", warning);
        }
        Ok(mapping)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Hard errors for unusable mappings; warnings for categories whose id
    /// collides with the unknown-category default.
    pub fn validate(&self) -> Result<Vec<String>, CodecError> {
        self.scaler_params.check()?;
        let mut warnings = Vec::new();
        for (table, map) in [
            ("device_mapping", &self.device_mapping),
            ("os_mapping", &self.os_mapping),
            ("gender_mapping", &self.gender_mapping),
        ] {
            let mut ambiguous: Vec<&String> = map.iter()
                .filter(|(_, id)| **id == UNKNOWN_CATEGORY_ID)
                .map(|(k, _)| k)
                .collect();
            ambiguous.sort();
            for category in ambiguous {
                warnings.push(format!(
                    "{}: `{}` has id {}, indistinguishable from an unseen category",
                    table, category, UNKNOWN_CATEGORY_ID));
            }
        }
        Ok(warnings)
    }
}

// -----------------------------------------------------------------------------
// Input / output
// -----------------------------------------------------------------------------

/// Raw attributes as collected on the device. Every field is required by
/// `encode`; `Option` only exists so a missing one can be reported.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawUserAttributes {
    pub device_model: Option<String>,
    pub os: Option<String>,
    pub gender: Option<String>,
    pub age: Option<f64>,
    pub app_usage_time: Option<f64>,
    pub screen_time: Option<f64>,
    pub battery_drain: Option<f64>,
    pub apps_installed: Option<f64>,
    pub data_usage: Option<f64>,
    pub behavior_class: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector(pub [f64; FEATURE_COUNT]);

impl FeatureVector {
    pub fn named(&self) -> Vec<(&'static str, f64)> {
        FEATURE_ORDER.iter().copied().zip(self.0.iter().copied()).collect()
    }
}

impl std::fmt::Display for FeatureVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 { write!(f, ", ")?; }
            write!(f, "{}", v)?;
        }
        write!(f, "]")
    }
}

// -----------------------------------------------------------------------------
// Encoding
// -----------------------------------------------------------------------------

fn require<'a, T>(value: &'a Option<T>, name: &'static str) -> Result<&'a T, CodecError> {
    value.as_ref().ok_or(CodecError::UnknownField(name))
}

fn lookup(table: &HashMap<String, u32>, key: &str, field: &'static str,
          defaulted: &mut Vec<&'static str>) -> u32 {
    match table.get(key) {
        Some(id) => *id,
        None => {
            defaulted.push(field);
            UNKNOWN_CATEGORY_ID
        }
    }
}

pub fn encode(user: &RawUserAttributes, mapping: &FeatureMapping) -> Result<FeatureVector, CodecError> {
    encode_with_report(user, mapping).map(|(v, _)| v)
}

/// Like `encode`, also naming the categorical fields that fell back to id 0.
pub fn encode_with_report(user: &RawUserAttributes, mapping: &FeatureMapping)
    -> Result<(FeatureVector, Vec<&'static str>), CodecError> {
    let device = require(&user.device_model, "device_model")?;
    let os = require(&user.os, "os")?;
    let gender = require(&user.gender, "gender")?;
    let age = *require(&user.age, "age")?;
    let raw = [
        *require(&user.app_usage_time, "app_usage_time")?,
        *require(&user.screen_time, "screen_time")?,
        *require(&user.battery_drain, "battery_drain")?,
        *require(&user.apps_installed, "apps_installed")?,
        *require(&user.data_usage, "data_usage")?,
        age,
    ];
    let behavior_class = *require(&user.behavior_class, "behavior_class")?;

    mapping.scaler_params.check()?;
    let scaled = mapping.scaler_params.transform(&raw);

    let mut defaulted = Vec::new();
    let device_id = lookup(&mapping.device_mapping, device, "device_model", &mut defaulted);
    let os_id = lookup(&mapping.os_mapping, os, "os", &mut defaulted);
    let gender_id = lookup(&mapping.gender_mapping, gender, "gender", &mut defaulted);
    if !defaulted.is_empty() {
        log::warn!("⚠️ Unseen categories encoded as id {}: {:?}", UNKNOWN_CATEGORY_ID, defaulted);
    }

    let vector = FeatureVector([
        device_id as f64,
        os_id as f64,
        gender_id as f64,
        age,
        scaled[0],
        scaled[1],
        scaled[2],
        scaled[3],
        scaled[4],
        behavior_class,
    ]);
    Ok((vector, defaulted))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_mapping() -> FeatureMapping {
        FeatureMapping {
            device_mapping: HashMap::from([
                ("Google Pixel 5".to_string(), 3),
                ("iPhone 12".to_string(), 4),
                ("Samsung Galaxy S21".to_string(), 5),
            ]),
            os_mapping: HashMap::from([("Android".to_string(), 1), ("iOS".to_string(), 2)]),
            gender_mapping: HashMap::from([("Female".to_string(), 1), ("Male".to_string(), 2)]),
            scaler_params: ScalerParams {
                scale: vec![1.0 / 590.0, 1.0 / 11.0, 1.0 / 2698.0, 1.0 / 89.0, 1.0 / 2398.0, 1.0 / 41.0],
                min: vec![-30.0 / 590.0, -1.0 / 11.0, -302.0 / 2698.0, -10.0 / 89.0, -102.0 / 2398.0, -18.0 / 41.0],
            },
        }
    }

    fn pixel_user() -> RawUserAttributes {
        RawUserAttributes {
            device_model: Some("Google Pixel 5".into()),
            os: Some("Android".into()),
            gender: Some("Male".into()),
            age: Some(30.0),
            app_usage_time: Some(300.0),
            screen_time: Some(6.0),
            battery_drain: Some(1500.0),
            apps_installed: Some(50.0),
            data_usage: Some(1000.0),
            behavior_class: Some(3.0),
        }
    }

    #[test]
    fn test_pixel_example_layout() {
        let m = sample_mapping();
        let v = encode(&pixel_user(), &m).unwrap();
        let s = &m.scaler_params;
        assert_eq!(v.0.len(), 10);
        assert_eq!(&v.0[0..3], &[3.0, 1.0, 2.0]);
        assert_eq!(v.0[3], 30.0);
        assert_eq!(v.0[4], 300.0 * s.scale[0] + s.min[0]);
        assert_eq!(v.0[5], 6.0 * s.scale[1] + s.min[1]);
        assert_eq!(v.0[6], 1500.0 * s.scale[2] + s.min[2]);
        assert_eq!(v.0[7], 50.0 * s.scale[3] + s.min[3]);
        assert_eq!(v.0[8], 1000.0 * s.scale[4] + s.min[4]);
        assert_eq!(v.0[9], 3.0);
        let named = v.named();
        assert_eq!(named[3], ("age", 30.0));
        assert_eq!(named[9], ("behavior_class", 3.0));
    }

    #[test]
    fn test_encode_deterministic_bits() {
        let m = sample_mapping();
        let first = encode(&pixel_user(), &m).unwrap();
        for _ in 0..100 {
            let again = encode(&pixel_user(), &m).unwrap();
            let a: Vec<u64> = first.0.iter().map(|x| x.to_bits()).collect();
            let b: Vec<u64> = again.0.iter().map(|x| x.to_bits()).collect();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_unseen_category_defaults_to_zero() {
        let m = sample_mapping();
        let mut user = pixel_user();
        user.device_model = Some("Unknown XYZ".into());
        user.os = Some("HarmonyOS".into());
        let (v, defaulted) = encode_with_report(&user, &m).unwrap();
        assert_eq!(v.0[0], 0.0);
        assert_eq!(v.0[1], 0.0);
        assert_eq!(v.0[2], 2.0);
        assert_eq!(defaulted, vec!["device_model", "os"]);
    }

    #[test]
    fn test_missing_attribute_is_unknown_field() {
        let m = sample_mapping();
        let mut user = pixel_user();
        user.screen_time = None;
        assert!(matches!(encode(&user, &m), Err(CodecError::UnknownField("screen_time"))));
        let mut user = pixel_user();
        user.gender = None;
        assert!(matches!(encode(&user, &m), Err(CodecError::UnknownField("gender"))));
    }

    #[test]
    fn test_scaler_length_checked() {
        let mut m = sample_mapping();
        m.scaler_params.min.pop();
        assert!(matches!(encode(&pixel_user(), &m), Err(CodecError::InvalidMapping(_))));
        assert!(m.validate().is_err());
    }

    #[test]
    fn test_validate_flags_zero_ids() {
        let mut m = sample_mapping();
        assert!(m.validate().unwrap().is_empty());
        m.gender_mapping.insert("Other".into(), 0);
        let warnings = m.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("gender_mapping"));
    }

    #[test]
    fn test_mapping_json_keys() {
        let text = r#"{
            "device_mapping": {"Google Pixel 5": 3},
            "os_mapping": {"Android": 1},
            "gender_mapping": {"Male": 2},
            "scaler_params": {
                "scale_": [0.1, 0.2, 0.3, 0.4, 0.5, 0.6],
                "min_": [0.0, -0.1, -0.2, -0.3, -0.4, -0.5]
            }
        }"#;
        let m = FeatureMapping::from_json(text).unwrap();
        assert_eq!(m.device_mapping["Google Pixel 5"], 3);
        assert_eq!(m.scaler_params.scale[5], 0.6);
        let user: RawUserAttributes = serde_json::from_str(r#"{"device_model": "Google Pixel 5"}"#).unwrap();
        assert!(matches!(encode(&user, &m), Err(CodecError::UnknownField("os"))));
    }
}
