// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Tag registry.
//!
//! The registry is the fixed list of process variables to monitor. It is
//! built once, shared as `Arc<TagRegistry>` and never mutated afterwards.
//! Iteration follows declaration order so monitored items are always
//! created in the same sequence.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, OpcUaError, OpcUaResult};
use crate::types::NodeId;

/// The machine tags monitored when no explicit list is configured.
pub const BUILTIN_TAGS: &[&str] = &[
    "ActTemperaturePIR2",
    "ActSpeedRPMEntryRoll",
    "SetPointDephaseRemote",
    "SetTemperatureWarmCylinder",
    "ActTemperatureWarmCylinder",
    "ActCountermeterTotal",
    "ActSpeedBrakeRoll",
    "ActTorqueBrakeRoll",
    "ActSpeedWebGuideRoll",
    "ActSpeedPullRoll",
    "ActSpeedCoolBelt",
    "ActTorqueWebGuideRoll",
    "ActTorquePullRoll",
    "ActTorqueWarmCylinder",
    "ActSpeedWarmCylinder",
    "SetPointDephase",
    "ActExitBeltTension",
    "ActLineSpeed",
    "ActEntryWiderTension",
    "ActPosBeltLeftPress",
    "ENB_Scheda1",
    "ENA_Scheda1",
    "ActPosBeltRightPress",
    "CycleA_Scheda1",
    "ActTorqueCoolBelt",
    "ActEncoderIn",
    "PIR_1_mA",
    "PIR_2_mA",
    "ActEncoder2",
    "ActThermo1",
    "ActThermo2",
    "ENA_Scheda2",
    "ENB_Scheda2",
    "CycleB_Scheda1",
    "CycleA_Scheda2",
    "ActThermo3",
    "ActEncoder3",
    "ENA_Scheda3",
    "ENB_Scheda3",
    "CycleB_Scheda2",
    "ActEncoder4",
    "ActEncoderOut",
    "ActSteamFlowTotal",
    "ActSteamFlow",
    "ActSteamFlowPressure",
    "ActSteamFlowTemperature",
    "SetEntryWiderTension",
    "ActTemperaturePIR1",
    "SetExitBeltTension",
    "ActTorqueFolder",
    "ActSpeedRPMWebGuideRoll",
    "ActSpeedRPMBrake",
    "ActSpeedRPMCentralCylinder",
    "ActSpeedRPMCoolingBelt",
    "ActSpeedRPMPullRoll",
    "ActSpeedRPMFolder",
    "Act_VoltageL1N",
    "Act_VoltageL2N",
    "Act_VoltageL3N",
    "Act_CurrentL1N",
    "Act_CurrentL2N",
    "Act_CurrentL3N",
    "Act_ActivePower",
    "EnableSetPointDephaseRemote",
    "CycleA_Scheda3",
    "ActSteamFlowPower",
    "SetPointSpeedRemote",
    "SetWebguideRollFeedbackType",
    "SetLineSpeed",
];

// =============================================================================
// TagName
// =============================================================================

/// Name of a monitored process variable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagName(String);

impl TagName {
    /// Creates a tag name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TagName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TagName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for TagName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TagName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TagName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

// =============================================================================
// TagDefinition
// =============================================================================

/// A tag as declared in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    /// Tag name.
    pub name: String,
    /// Explicit node id; `None` means `ns=<namespace>;s=<name>`.
    pub node_id: Option<NodeId>,
}

impl TagDefinition {
    /// A tag addressed by its name in the default namespace.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            node_id: None,
        }
    }

    /// A tag with an explicit node id.
    pub fn with_node_id(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id: Some(node_id),
        }
    }
}

// =============================================================================
// TagRegistry
// =============================================================================

/// The immutable set of tags to monitor.
#[derive(Debug, Clone)]
pub struct TagRegistry {
    entries: Vec<(TagName, NodeId)>,
    index: HashMap<TagName, usize>,
}

impl TagRegistry {
    /// Builds a registry, resolving bare names in `namespace_index`.
    ///
    /// Empty and duplicate names are rejected.
    pub fn new(
        namespace_index: u16,
        definitions: impl IntoIterator<Item = TagDefinition>,
    ) -> OpcUaResult<Self> {
        let mut entries = Vec::new();
        let mut index = HashMap::new();

        for definition in definitions {
            let name = definition.name.trim();
            if name.is_empty() {
                return Err(OpcUaError::invalid_config("tags", "Tag name must not be empty"));
            }

            let tag = TagName::new(name);
            if index.contains_key(&tag) {
                return Err(ConfigurationError::DuplicateTag {
                    tag: tag.to_string(),
                }
                .into());
            }

            let node_id = definition
                .node_id
                .unwrap_or_else(|| NodeId::string(namespace_index, name));
            index.insert(tag.clone(), entries.len());
            entries.push((tag, node_id));
        }

        Ok(Self { entries, index })
    }

    /// Builds a registry from bare names.
    pub fn from_names<I, S>(namespace_index: u16, names: I) -> OpcUaResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(namespace_index, names.into_iter().map(TagDefinition::named))
    }

    /// The built-in machine tag list.
    pub fn builtin(namespace_index: u16) -> Self {
        let entries: Vec<_> = BUILTIN_TAGS
            .iter()
            .map(|name| (TagName::new(*name), NodeId::string(namespace_index, *name)))
            .collect();
        let index = entries
            .iter()
            .enumerate()
            .map(|(i, (tag, _))| (tag.clone(), i))
            .collect();
        Self { entries, index }
    }

    /// Number of tags.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no tags are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns `true` if the tag is registered.
    pub fn contains(&self, tag: &str) -> bool {
        self.index.contains_key(tag)
    }

    /// Returns the registered tag name, if any.
    pub fn get(&self, tag: &str) -> Option<&TagName> {
        self.index.get(tag).map(|&i| &self.entries[i].0)
    }

    /// Returns the node id a tag is monitored through.
    pub fn node_id(&self, tag: &str) -> Option<&NodeId> {
        self.index.get(tag).map(|&i| &self.entries[i].1)
    }

    /// Iterates tags in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&TagName, &NodeId)> + '_ {
        self.entries.iter().map(|(tag, node_id)| (tag, node_id))
    }

    /// Iterates tag names in declaration order.
    pub fn tags(&self) -> impl Iterator<Item = &TagName> + '_ {
        self.entries.iter().map(|(tag, _)| tag)
    }
}
