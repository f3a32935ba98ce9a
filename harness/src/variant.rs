// Copyright 2026 Maurice S. Barnum
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::Error;
use crate::Result;
use crate::pipeline;
use crate::pipeline::QueryParams;
use crate::store::IndexSpec;
use crate::store::index_name;

/// Collection every variant queries
pub const QUERY_COLLECTION: &str = "Profiles";

pub const CITY_KEYS: &[&str] = &["contact.address.city"];
pub const CITY_DEVICE_KEYS: &[&str] = &["contact.address.city", "devices.deviceName"];
pub const CITY_DEVICE_PROFILE_KEYS: &[&str] =
    &["contact.address.city", "devices.deviceName", "profileID"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PipelineVariant {
    OriginalPipeline,
    NoUnwinds,
    NoMapping,
    DuplicateDeviceNames,
    IndexSort,
}

#[derive(Debug)]
pub struct VariantDescriptor {
    pub variant: PipelineVariant,
    pub name: &'static str,
    /// Key lists of the Profiles indexes the variant needs visible
    pub index_keys: &'static [&'static [&'static str]],
    pub summary: &'static str,
}

// Declaration order is execution order
static VARIANTS: [VariantDescriptor; 5] = [
    VariantDescriptor {
        variant: PipelineVariant::OriginalPipeline,
        name: "originalPipeline",
        index_keys: &[CITY_KEYS],
        summary: "join through Mappings, unwind, regroup per profile",
    },
    VariantDescriptor {
        variant: PipelineVariant::NoUnwinds,
        name: "noUnwinds",
        index_keys: &[CITY_KEYS],
        summary: "join through Mappings without unwinding",
    },
    VariantDescriptor {
        variant: PipelineVariant::NoMapping,
        name: "noMapping",
        index_keys: &[CITY_KEYS],
        summary: "join Devices through embedded serial numbers",
    },
    VariantDescriptor {
        variant: PipelineVariant::DuplicateDeviceNames,
        name: "duplicateDeviceNames",
        index_keys: &[CITY_DEVICE_KEYS],
        summary: "filter on embedded device names, sort, page, then join",
    },
    VariantDescriptor {
        variant: PipelineVariant::IndexSort,
        name: "indexSort",
        index_keys: &[CITY_DEVICE_PROFILE_KEYS],
        summary: "filter on embedded device names, ordering from the compound index",
    },
];

impl PipelineVariant {
    pub const ALL: [PipelineVariant; 5] = [
        PipelineVariant::OriginalPipeline,
        PipelineVariant::NoUnwinds,
        PipelineVariant::NoMapping,
        PipelineVariant::DuplicateDeviceNames,
        PipelineVariant::IndexSort,
    ];

    pub fn descriptor(self) -> &'static VariantDescriptor {
        &VARIANTS[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Names of the Profiles indexes made visible while this variant runs
    pub fn required_indexes(self) -> Vec<String> {
        self.descriptor()
            .index_keys
            .iter()
            .map(|keys| index_name(keys.iter().copied()))
            .collect()
    }

    pub fn pipeline(self, params: &QueryParams) -> Vec<Value> {
        match self {
            PipelineVariant::OriginalPipeline => pipeline::original(params),
            PipelineVariant::NoUnwinds => pipeline::no_unwinds(params),
            PipelineVariant::NoMapping => pipeline::no_mapping(params),
            PipelineVariant::DuplicateDeviceNames => pipeline::duplicate_device_names(params),
            PipelineVariant::IndexSort => pipeline::index_sort(params),
        }
    }

    /// Resolve names to variants, in execution order.  An empty list selects every variant.
    pub fn select<S: AsRef<str>>(names: &[S]) -> Result<Vec<PipelineVariant>> {
        if names.is_empty() {
            return Ok(Self::ALL.to_vec());
        }
        let mut selected = names
            .iter()
            .map(|n| n.as_ref().parse())
            .collect::<Result<Vec<PipelineVariant>>>()?;
        selected.sort();
        selected.dedup();
        Ok(selected)
    }
}

impl fmt::Display for PipelineVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PipelineVariant {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.name() == s)
            .ok_or_else(|| Error::invalid_config(format!("unknown pipeline variant {s}")))
    }
}

/// Every index the benchmark depends on, by collection.  The Profiles indexes start hidden;
/// each variant reveals only its own.
pub fn benchmark_indexes() -> Vec<(&'static str, IndexSpec)> {
    let hidden = |keys: &[&str]| {
        IndexSpec::builder()
            .keys(keys.iter().map(|k| (*k).to_string()).collect())
            .hidden(true)
            .build()
    };
    let visible = |keys: &[&str]| {
        IndexSpec::builder()
            .keys(keys.iter().map(|k| (*k).to_string()).collect())
            .build()
    };
    vec![
        (QUERY_COLLECTION, hidden(CITY_KEYS)),
        (QUERY_COLLECTION, hidden(CITY_DEVICE_KEYS)),
        (QUERY_COLLECTION, hidden(CITY_DEVICE_PROFILE_KEYS)),
        ("Mappings", visible(&["profileID"])),
        ("Devices", visible(&["deviceSN", "deviceName"])),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_order_and_names() {
        let names: Vec<_> = PipelineVariant::ALL.iter().map(|v| v.name()).collect();
        assert_eq!(
            vec![
                "originalPipeline",
                "noUnwinds",
                "noMapping",
                "duplicateDeviceNames",
                "indexSort"
            ],
            names
        );
        for v in PipelineVariant::ALL {
            assert_eq!(v, v.descriptor().variant);
            assert_eq!(Ok(v), v.name().parse::<PipelineVariant>().map_err(|e| e.to_string()));
        }
    }

    #[test]
    fn test_required_indexes() {
        assert_eq!(
            vec!["contact.address.city_1"],
            PipelineVariant::NoMapping.required_indexes()
        );
        assert_eq!(
            vec!["contact.address.city_1_devices.deviceName_1"],
            PipelineVariant::DuplicateDeviceNames.required_indexes()
        );
        assert_eq!(
            vec!["contact.address.city_1_devices.deviceName_1_profileID_1"],
            PipelineVariant::IndexSort.required_indexes()
        );
    }

    #[test]
    fn test_select() -> anyhow::Result<()> {
        assert_eq!(PipelineVariant::ALL.to_vec(), PipelineVariant::select::<&str>(&[])?);
        let picked = PipelineVariant::select(&["indexSort", "noUnwinds", "indexSort"])?;
        assert_eq!(
            vec![PipelineVariant::NoUnwinds, PipelineVariant::IndexSort],
            picked
        );
        assert!(matches!(
            PipelineVariant::select(&["fastest"]),
            Err(Error::InvalidConfiguration(_))
        ));
        Ok(())
    }

    #[test]
    fn test_benchmark_indexes_cover_every_variant() {
        let indexes = benchmark_indexes();
        for v in PipelineVariant::ALL {
            for name in v.required_indexes() {
                let found = indexes
                    .iter()
                    .find(|(coll, spec)| *coll == QUERY_COLLECTION && spec.name() == name);
                assert!(found.is_some_and(|(_, spec)| spec.hidden), "{name}");
            }
        }
        assert!(
            indexes
                .iter()
                .filter(|(coll, _)| *coll != QUERY_COLLECTION)
                .all(|(_, spec)| !spec.hidden)
        );
    }
}
