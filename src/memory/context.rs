//! Resident and facility context builders
//!
//! Both render free-text blocks that are injected into system prompts.

use crate::memory::preferences::{confidence_suffix, PreferenceStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

//
// ================= Residents =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidentProfile {
    pub id: String,
    pub name: String,
    pub room: Option<String>,
    pub notes: Option<String>,
}

/// One entry of a residents seed file. A fixed `id` keeps preferences stored
/// in Postgres attached to the same resident across restarts.
#[derive(Debug, Clone, Deserialize)]
pub struct ResidentSeed {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[async_trait]
pub trait ResidentDirectory: Send + Sync {
    async fn get(&self, resident_id: &str) -> crate::Result<Option<ResidentProfile>>;

    /// Case-insensitive exact name match
    async fn find_by_name(&self, name: &str) -> crate::Result<Option<ResidentProfile>>;

    /// Prompt block describing the resident; empty when unknown.
    async fn context_block(&self, resident_id: &str) -> crate::Result<String>;
}

#[derive(Default)]
pub struct InMemoryResidents {
    profiles: Arc<RwLock<HashMap<String, ResidentProfile>>>,
    preferences: Option<Arc<dyn PreferenceStore>>,
}

impl InMemoryResidents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Include known preferences in the context block.
    pub fn with_preferences(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preferences = Some(store);
        self
    }

    pub async fn add(&self, name: &str, room: Option<&str>, notes: Option<&str>) -> String {
        self.insert(ResidentSeed {
            id: None,
            name: name.to_string(),
            room: room.map(str::to_string),
            notes: notes.map(str::to_string),
        })
        .await
    }

    /// Load a JSON array of [`ResidentSeed`]s; returns how many were added.
    pub async fn load_json(&self, json: &str) -> crate::Result<usize> {
        let seeds: Vec<ResidentSeed> = serde_json::from_str(json)?;
        let count = seeds.len();
        for seed in seeds {
            self.insert(seed).await;
        }
        Ok(count)
    }

    async fn insert(&self, seed: ResidentSeed) -> String {
        let id = seed
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let profile = ResidentProfile {
            id: id.clone(),
            name: seed.name,
            room: seed.room,
            notes: seed.notes,
        };
        self.profiles.write().await.insert(id.clone(), profile);
        id
    }

    pub async fn list(&self) -> Vec<ResidentProfile> {
        let mut all: Vec<ResidentProfile> = self.profiles.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[async_trait]
impl ResidentDirectory for InMemoryResidents {
    async fn get(&self, resident_id: &str) -> crate::Result<Option<ResidentProfile>> {
        Ok(self.profiles.read().await.get(resident_id).cloned())
    }

    async fn find_by_name(&self, name: &str) -> crate::Result<Option<ResidentProfile>> {
        let wanted = name.trim().to_lowercase();
        Ok(self
            .profiles
            .read()
            .await
            .values()
            .find(|p| p.name.to_lowercase() == wanted)
            .cloned())
    }

    async fn context_block(&self, resident_id: &str) -> crate::Result<String> {
        let Some(resident) = self.get(resident_id).await? else {
            return Ok(String::new());
        };

        let mut parts = vec![format!("Resident: {}", resident.name)];
        if let Some(room) = resident.room.as_deref().filter(|r| !r.is_empty()) {
            parts.push(format!("Room: {}", room));
        }
        if let Some(notes) = resident.notes.as_deref().filter(|n| !n.is_empty()) {
            parts.push(format!("Notes: {}", notes));
        }

        if let Some(store) = &self.preferences {
            let prefs = store.list(resident_id, None).await?;
            if !prefs.is_empty() {
                parts.push("Known preferences:".to_string());
                for p in prefs {
                    parts.push(format!(
                        "  - {}/{}: {}{}",
                        p.category,
                        p.key,
                        p.value,
                        confidence_suffix(p.confidence)
                    ));
                }
            }
        }

        Ok(parts.join("\n"))
    }
}

//
// ================= Facility =================
//

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(default = "default_location_type")]
    pub location_type: String,
    #[serde(default)]
    pub floor: i32,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_navigable")]
    pub navigable: bool,
}

fn default_location_type() -> String {
    "room".to_string()
}

fn default_navigable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityObject {
    pub name: String,
    /// Name of the location holding the object
    pub location: String,
    /// Display name of the owning resident
    #[serde(default)]
    pub owner: Option<String>,
}

#[async_trait]
pub trait FacilityMap: Send + Sync {
    async fn context_block(&self) -> crate::Result<String>;
}

/// Fixed facility layout loaded at startup
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StaticFacility {
    locations: Vec<Location>,
    objects: Vec<FacilityObject>,
}

impl StaticFacility {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `{"locations": [...], "objects": [...]}`; both keys optional.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.locations.push(location);
        self
    }

    pub fn with_object(mut self, object: FacilityObject) -> Self {
        self.objects.push(object);
        self
    }

    pub fn find_location(&self, name: &str) -> Option<&Location> {
        self.locations
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name.trim()))
    }

    fn render(&self) -> String {
        if self.locations.is_empty() {
            return "No facility map configured.".to_string();
        }

        let mut locations: Vec<&Location> = self.locations.iter().collect();
        locations.sort_by(|a, b| a.name.cmp(&b.name));

        let mut parts = vec!["Facility layout:".to_string()];
        for loc in locations {
            let desc = loc
                .description
                .as_deref()
                .map(|d| format!(" - {}", d))
                .unwrap_or_default();
            let nav = if loc.navigable { "" } else { " [not navigable]" };
            parts.push(format!(
                "  - {} ({}, floor {}){}{}",
                loc.name, loc.location_type, loc.floor, desc, nav
            ));

            let mut objects: Vec<&FacilityObject> = self
                .objects
                .iter()
                .filter(|o| o.location.eq_ignore_ascii_case(&loc.name))
                .collect();
            objects.sort_by(|a, b| a.name.cmp(&b.name));
            for obj in objects {
                let owner = obj
                    .owner
                    .as_deref()
                    .map(|o| format!(" [belongs to {}]", o))
                    .unwrap_or_default();
                parts.push(format!("      * {}{}", obj.name, owner));
            }
        }

        parts.join("\n")
    }
}

#[async_trait]
impl FacilityMap for StaticFacility {
    async fn context_block(&self) -> crate::Result<String> {
        Ok(self.render())
    }
}
