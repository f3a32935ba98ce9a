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

//! Stage lists for each pipeline variant.  All of them answer the same question: the first page
//! of profiles in a city that can use a device with a given name, with that device attached.

use rand::Rng;
use serde_json::Value;
use serde_json::json;

use crate::generator;

pub const PAGE_SKIP: u64 = 0;
pub const PAGE_LIMIT: u64 = 10;

/// The randomized parameters of one query
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryParams {
    pub city: String,
    pub device_name: String,
}

impl QueryParams {
    pub fn new(city: impl Into<String>, device_name: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            device_name: device_name.into(),
        }
    }

    /// A random city and a random shared or personal device name, with even odds
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let (city, _) = generator::random_city_state(rng);
        let shared = rng.gen_bool(0.5);
        Self::new(city, generator::random_device_name(rng, shared))
    }
}

fn devices_named(from_field: &str, device_name: &str) -> Value {
    json!({"$lookup": {
        "from": "Devices",
        "localField": from_field,
        "foreignField": "deviceSN",
        "pipeline": [
            {"$match": {"deviceName": device_name}},
            {"$set": {"_id": "$$REMOVE"}},
        ],
        "as": "deviceData",
    }})
}

fn page() -> [Value; 2] {
    [json!({"$skip": PAGE_SKIP}), json!({"$limit": PAGE_LIMIT})]
}

fn sort_by_profile() -> Value {
    json!({"$sort": {"profileID": 1}})
}

fn strip(fields: &[&str]) -> Value {
    let removals: serde_json::Map<String, Value> = fields
        .iter()
        .map(|f| ((*f).to_string(), json!("$$REMOVE")))
        .collect();
    json!({"$set": removals})
}

/// Join through Mappings, unwind both joins and regroup per profile
pub fn original(p: &QueryParams) -> Vec<Value> {
    let mut stages = vec![
        json!({"$match": {"contact.address.city": p.city}}),
        json!({"$lookup": {
            "from": "Mappings",
            "localField": "profileID",
            "foreignField": "profileID",
            "as": "mappingData",
        }}),
        json!({"$unwind": "$mappingData"}),
        devices_named("mappingData.deviceSN", &p.device_name),
        json!({"$unwind": "$deviceData"}),
        json!({"$group": {
            "_id": "$profileID",
            "firstName": {"$first": "$firstName"},
            "lastName": {"$first": "$lastName"},
            "contact": {"$first": "$contact"},
            "ssn": {"$first": "$SSN"},
            "deviceData": {"$push": "$deviceData"},
        }}),
        json!({"$set": {"profileID": "$_id", "_id": "$$REMOVE"}}),
        sort_by_profile(),
    ];
    stages.extend(page());
    stages
}

/// Join through Mappings without unwinding; drop profiles with no matching device
pub fn no_unwinds(p: &QueryParams) -> Vec<Value> {
    let mut stages = vec![
        json!({"$match": {"contact.address.city": p.city}}),
        json!({"$lookup": {
            "from": "Mappings",
            "localField": "profileID",
            "foreignField": "profileID",
            "as": "mappingData",
        }}),
        devices_named("mappingData.deviceSN", &p.device_name),
        strip(&["_id", "deviceSNs", "devices", "mappingData", "customerType"]),
        json!({"$match": {"deviceData": {"$ne": []}}}),
        sort_by_profile(),
    ];
    stages.extend(page());
    stages
}

/// Join Devices directly through the serial numbers embedded in each profile
pub fn no_mapping(p: &QueryParams) -> Vec<Value> {
    let mut stages = vec![
        json!({"$match": {"contact.address.city": p.city}}),
        devices_named("deviceSNs", &p.device_name),
        strip(&["_id", "deviceSNs", "devices", "customerType"]),
        json!({"$match": {"deviceData": {"$ne": []}}}),
        sort_by_profile(),
    ];
    stages.extend(page());
    stages
}

/// Filter on the embedded device names first, then page, then join
pub fn duplicate_device_names(p: &QueryParams) -> Vec<Value> {
    let mut stages = vec![
        json!({"$match": {
            "contact.address.city": p.city,
            "devices.deviceName": p.device_name,
        }}),
        sort_by_profile(),
    ];
    stages.extend(page());
    stages.push(devices_named("devices.deviceSN", &p.device_name));
    stages.push(strip(&[
        "_id",
        "deviceSNs",
        "deviceNames",
        "mappingData",
        "customerType",
    ]));
    stages
}

/// As [`duplicate_device_names`], leaving the ordering to the compound index
pub fn index_sort(p: &QueryParams) -> Vec<Value> {
    let mut stages = vec![json!({"$match": {
        "contact.address.city": p.city,
        "devices.deviceName": p.device_name,
    }})];
    stages.extend(page());
    stages.push(devices_named("devices.deviceSN", &p.device_name));
    stages.push(strip(&[
        "_id",
        "deviceSNs",
        "devices",
        "mappingData",
        "customerType",
    ]));
    stages
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn stage_names(stages: &[Value]) -> Vec<String> {
        stages
            .iter()
            .filter_map(|s| s.as_object()?.keys().next().cloned())
            .collect()
    }

    #[test]
    fn test_original_shape() {
        let stages = original(&QueryParams::new("Boise", "Roku"));
        assert_eq!(
            vec![
                "$match", "$lookup", "$unwind", "$lookup", "$unwind", "$group", "$set", "$sort",
                "$skip", "$limit"
            ],
            stage_names(&stages)
        );
        assert_eq!(json!("Boise"), stages[0]["$match"]["contact.address.city"]);
        assert_eq!(
            json!("Roku"),
            stages[3]["$lookup"]["pipeline"][0]["$match"]["deviceName"]
        );
    }

    #[test]
    fn test_variants_without_unwind() {
        let p = QueryParams::new("Reno", "iPad");
        for stages in [no_unwinds(&p), no_mapping(&p)] {
            let names = stage_names(&stages);
            assert!(!names.iter().any(|n| n == "$unwind" || n == "$group"));
            assert_eq!(Some("$limit"), names.last().map(String::as_str));
        }
        assert_eq!(json!("deviceSNs"), no_mapping(&p)[1]["$lookup"]["localField"]);
        let lookups = stage_names(&no_mapping(&p))
            .into_iter()
            .filter(|n| n == "$lookup")
            .count();
        assert_eq!(1, lookups);
    }

    #[test]
    fn test_embedded_name_variants() {
        let p = QueryParams::new("Reno", "iPad");
        let dup = duplicate_device_names(&p);
        assert_eq!(
            vec!["$match", "$sort", "$skip", "$limit", "$lookup", "$set"],
            stage_names(&dup)
        );
        let sorted = index_sort(&p);
        assert_eq!(
            vec!["$match", "$skip", "$limit", "$lookup", "$set"],
            stage_names(&sorted)
        );
        assert_eq!(json!("iPad"), sorted[0]["$match"]["devices.deviceName"]);
    }

    #[test]
    fn test_random_params_are_reproducible() {
        let a = QueryParams::random(&mut StdRng::seed_from_u64(7));
        let b = QueryParams::random(&mut StdRng::seed_from_u64(7));
        assert_eq!(a, b);
        assert!(!a.city.is_empty());
        assert!(!a.device_name.is_empty());
    }
}
