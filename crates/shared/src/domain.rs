use serde::{Deserialize, Serialize};

/// Image formats the masking service accepts. Anything else is rejected
/// before a single byte leaves the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        match mime {
            "image/png" => Some(Self::Png),
            "image/jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
        }
    }

    /// File-picker extensions, with both jpeg spellings.
    pub fn accepted_extensions() -> &'static [&'static str] {
        &["png", "jpg", "jpeg"]
    }
}

/// How the service covers detected faces. Serialized on the wire as a
/// numeric code (1 = bouquet, 2 = postcard); unknown codes fall back to
/// the bouquet default on the server side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EditType {
    #[default]
    Bouquet,
    Postcard,
}

impl EditType {
    pub fn wire_code(self) -> u8 {
        match self {
            Self::Bouquet => 1,
            Self::Postcard => 2,
        }
    }

    pub fn from_wire_code(code: u8) -> Self {
        match code {
            2 => Self::Postcard,
            _ => Self::Bouquet,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Bouquet => "Bouquet",
            Self::Postcard => "Postcard",
        }
    }
}
