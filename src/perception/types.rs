use serde::{Deserialize, Deserializer, Serialize};

/// One UI element recognised by the parsing service.
///
/// Wire fields `content`, `confidence`, `interactivity` and `source` are optional;
/// absent or `null` values take the defaults below instead of failing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionElement {
    #[serde(rename = "type")]
    pub element_type: String,
    /// Bounding box [x1, y1, x2, y2] as reported by the service.
    pub bbox: [f64; 4],
    #[serde(default, deserialize_with = "null_as_default")]
    pub content: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub confidence: f64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub interactivity: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub source: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl DetectionElement {
    /// Centre of the bounding box in the service's coordinate space.
    pub fn center(&self) -> (f64, f64) {
        let [x1, y1, x2, y2] = self.bbox;
        ((x1 + x2) / 2.0, (y1 + y2) / 2.0)
    }

    /// True when `content` or `source` contains `needle`.
    /// `needle` must already be trimmed and lower-cased.
    pub(crate) fn mentions(&self, needle: &str) -> bool {
        self.content.to_lowercase().contains(needle) || self.source.to_lowercase().contains(needle)
    }
}
