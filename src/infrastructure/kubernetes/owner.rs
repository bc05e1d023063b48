// Copyright 2025 JiangLong.
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

//! Owner references that let the platform garbage-collect dependents.

use crate::shared::error::KubeError;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;

/// Builds a controller reference from an owner as returned by the control plane.
///
/// The owner must carry its server-assigned uid; a reference built from a
/// name alone would silently attach to a later object recreated under that name.
pub fn owner_reference<K>(owner: &K) -> Result<OwnerReference, KubeError>
where
    K: Resource<DynamicType = ()>,
{
    owner.controller_owner_ref(&()).ok_or_else(|| {
        KubeError::invalid_spec(format!(
            "{} '{}' has no server-assigned uid and cannot own other resources",
            K::kind(&()),
            owner.meta().name.as_deref().unwrap_or("<unnamed>")
        ))
    })
}

pub fn attach_owner<'a, K>(
    owner: &K,
    dependents: impl IntoIterator<Item = &'a mut ObjectMeta>,
) -> Result<(), KubeError>
where
    K: Resource<DynamicType = ()>,
{
    let reference = owner_reference(owner)?;
    for metadata in dependents {
        metadata.owner_references = Some(vec![reference.clone()]);
    }
    Ok(())
}
