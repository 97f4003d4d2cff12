use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;

/// A `providerID/modelID` pair pinning a prompt to a specific model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    #[serde(rename = "providerID")]
    pub provider_id: String,
    #[serde(rename = "modelID")]
    pub model_id: String,
}

impl ModelSelection {
    pub fn new(provider_id: impl Into<String>, model_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            model_id: model_id.into(),
        }
    }

    /// Splits on the first `/`; the remainder (slashes included) is the model id.
    pub fn parse(value: &str) -> Option<Self> {
        let (provider, model) = value.trim().split_once('/')?;
        if provider.is_empty() || model.is_empty() {
            return None;
        }
        Some(Self::new(provider, model))
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.provider_id, self.model_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Provider {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Models in the order the server listed them.
    #[serde(default, deserialize_with = "ordered_models")]
    pub models: Vec<ModelInfo>,
}

impl Provider {
    pub fn first_model(&self) -> Option<&ModelInfo> {
        self.models.first()
    }
}

/// Providers known to the server plus its per-provider default models.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProviderDirectory {
    #[serde(default)]
    pub providers: Vec<Provider>,
    #[serde(default)]
    pub default: HashMap<String, String>,
}

impl ProviderDirectory {
    /// The selection used when the caller has not pinned a model.
    ///
    /// Takes the first provider that has either a configured default or at
    /// least one model; `None` means the server should pick.
    pub fn default_selection(&self) -> Option<ModelSelection> {
        self.providers.iter().find_map(|provider| {
            let model = self
                .default
                .get(&provider.id)
                .cloned()
                .or_else(|| provider.first_model().map(|model| model.id.clone()))?;
            Some(ModelSelection::new(provider.id.clone(), model))
        })
    }

    pub fn all_selections(&self) -> Vec<ModelSelection> {
        self.providers
            .iter()
            .flat_map(|provider| {
                provider
                    .models
                    .iter()
                    .map(|model| ModelSelection::new(provider.id.clone(), model.id.clone()))
            })
            .collect()
    }
}

fn ordered_models<'de, D>(deserializer: D) -> Result<Vec<ModelInfo>, D::Error>
where
    D: Deserializer<'de>,
{
    struct OrderedModels;

    impl<'de> Visitor<'de> for OrderedModels {
        type Value = Vec<ModelInfo>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of model id to model descriptor")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut models = Vec::with_capacity(map.size_hint().unwrap_or_default());
            while let Some((key, descriptor)) = map.next_entry::<String, ModelDescriptor>()? {
                models.push(ModelInfo {
                    id: descriptor.id.unwrap_or(key),
                    name: descriptor.name.unwrap_or_default(),
                });
            }
            Ok(models)
        }
    }

    deserializer.deserialize_map(OrderedModels)
}

#[derive(Deserialize)]
struct ModelDescriptor {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
}
