// Copyright 2025 RustFS Team
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

//! Orchestration store: the Kubernetes reads and writes a reconcile pass performs.

use super::{Error, KubeSnafu, RecordSnafu};
use crate::types::v1alpha1::tenant::Tenant;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::api::rbac::v1 as rbacv1;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Api, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use snafu::ResultExt;
use std::fmt::Debug;

const FIELD_MANAGER: &str = "rustfs-operator";

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_tenant(&self, namespace: &str, name: &str) -> Result<Tenant, Error>;

    /// Tenants of `namespace`, or of every namespace when `None`.
    async fn list_tenants(&self, namespace: Option<&str>) -> Result<Vec<Tenant>, Error>;

    /// Replaces the status subresource. `tenant` carries the resource version to write against.
    async fn replace_tenant_status(&self, tenant: &Tenant) -> Result<Tenant, Error>;

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<appsv1::StatefulSet>, Error>;

    async fn list_statefulsets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<appsv1::StatefulSet>, Error>;

    async fn create_statefulset(
        &self,
        namespace: &str,
        statefulset: &appsv1::StatefulSet,
    ) -> Result<appsv1::StatefulSet, Error>;

    async fn replace_statefulset(
        &self,
        namespace: &str,
        statefulset: &appsv1::StatefulSet,
    ) -> Result<appsv1::StatefulSet, Error>;

    /// Deleting an absent StatefulSet succeeds.
    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<corev1::Pod>, Error>;

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<(), Error>;

    async fn get_secret(&self, namespace: &str, name: &str)
    -> Result<Option<corev1::Secret>, Error>;

    /// Deleting an absent Deployment succeeds.
    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error>;

    async fn apply_service(&self, namespace: &str, service: &corev1::Service) -> Result<(), Error>;

    async fn apply_service_account(
        &self,
        namespace: &str,
        service_account: &corev1::ServiceAccount,
    ) -> Result<(), Error>;

    async fn apply_role(&self, namespace: &str, role: &rbacv1::Role) -> Result<(), Error>;

    async fn apply_role_binding(
        &self,
        namespace: &str,
        role_binding: &rbacv1::RoleBinding,
    ) -> Result<(), Error>;

    async fn publish_event(
        &self,
        tenant: &Tenant,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error>;
}

pub struct KubeStore {
    client: kube::Client,
    recorder: Recorder,
}

impl KubeStore {
    pub fn new(client: kube::Client, instance: Option<String>) -> Self {
        let reporter = Reporter {
            controller: FIELD_MANAGER.into(),
            instance,
        };

        let recorder = Recorder::new(client.clone(), reporter);
        Self { client, recorder }
    }

    fn api<T>(&self, namespace: &str) -> Api<T>
    where
        T: Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_opt<T>(&self, name: &str, namespace: &str) -> Result<Option<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.api::<T>(namespace)
            .get_opt(name)
            .await
            .context(KubeSnafu)
    }

    async fn list<T>(&self, namespace: &str, selector: &str) -> Result<Vec<T>, Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        let params = ListParams::default().labels(selector);
        Ok(self
            .api::<T>(namespace)
            .list(&params)
            .await
            .context(KubeSnafu)?
            .items)
    }

    async fn delete<T>(&self, name: &str, namespace: &str) -> Result<(), Error>
    where
        T: Clone + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        match self
            .api::<T>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .context(KubeSnafu)
        {
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
            Ok(_) => Ok(()),
        }
    }

    async fn apply<T>(&self, resource: &T, namespace: &str) -> Result<(), Error>
    where
        T: Clone + Serialize + DeserializeOwned + Debug + Resource<Scope = NamespaceResourceScope>,
        <T as Resource>::DynamicType: Default,
    {
        self.api::<T>(namespace)
            .patch(
                &resource.name_any(),
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(resource),
            )
            .await
            .context(KubeSnafu)?;
        Ok(())
    }
}

#[async_trait]
impl Store for KubeStore {
    async fn get_tenant(&self, namespace: &str, name: &str) -> Result<Tenant, Error> {
        self.api::<Tenant>(namespace)
            .get(name)
            .await
            .context(KubeSnafu)
    }

    async fn list_tenants(&self, namespace: Option<&str>) -> Result<Vec<Tenant>, Error> {
        let api: Api<Tenant> = match namespace {
            Some(namespace) => self.api(namespace),
            None => Api::all(self.client.clone()),
        };
        Ok(api
            .list(&ListParams::default())
            .await
            .context(KubeSnafu)?
            .items)
    }

    async fn replace_tenant_status(&self, tenant: &Tenant) -> Result<Tenant, Error> {
        self.api::<Tenant>(&tenant.namespace()?)
            .replace_status(&tenant.name(), &PostParams::default(), tenant)
            .await
            .context(KubeSnafu)
    }

    async fn get_statefulset(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<appsv1::StatefulSet>, Error> {
        self.get_opt(name, namespace).await
    }

    async fn list_statefulsets(
        &self,
        namespace: &str,
        selector: &str,
    ) -> Result<Vec<appsv1::StatefulSet>, Error> {
        self.list(namespace, selector).await
    }

    async fn create_statefulset(
        &self,
        namespace: &str,
        statefulset: &appsv1::StatefulSet,
    ) -> Result<appsv1::StatefulSet, Error> {
        self.api::<appsv1::StatefulSet>(namespace)
            .create(&PostParams::default(), statefulset)
            .await
            .context(KubeSnafu)
    }

    async fn replace_statefulset(
        &self,
        namespace: &str,
        statefulset: &appsv1::StatefulSet,
    ) -> Result<appsv1::StatefulSet, Error> {
        self.api::<appsv1::StatefulSet>(namespace)
            .replace(&statefulset.name_any(), &PostParams::default(), statefulset)
            .await
            .context(KubeSnafu)
    }

    async fn delete_statefulset(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.delete::<appsv1::StatefulSet>(name, namespace).await
    }

    async fn list_pods(&self, namespace: &str, selector: &str) -> Result<Vec<corev1::Pod>, Error> {
        self.list(namespace, selector).await
    }

    async fn delete_pods(&self, namespace: &str, selector: &str) -> Result<(), Error> {
        let params = ListParams::default().labels(selector);
        self.api::<corev1::Pod>(namespace)
            .delete_collection(&DeleteParams::default(), &params)
            .await
            .context(KubeSnafu)?;
        Ok(())
    }

    async fn get_secret(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<corev1::Secret>, Error> {
        self.get_opt(name, namespace).await
    }

    async fn delete_deployment(&self, namespace: &str, name: &str) -> Result<(), Error> {
        self.delete::<appsv1::Deployment>(name, namespace).await
    }

    async fn apply_service(&self, namespace: &str, service: &corev1::Service) -> Result<(), Error> {
        self.apply(service, namespace).await
    }

    async fn apply_service_account(
        &self,
        namespace: &str,
        service_account: &corev1::ServiceAccount,
    ) -> Result<(), Error> {
        self.apply(service_account, namespace).await
    }

    async fn apply_role(&self, namespace: &str, role: &rbacv1::Role) -> Result<(), Error> {
        self.apply(role, namespace).await
    }

    async fn apply_role_binding(
        &self,
        namespace: &str,
        role_binding: &rbacv1::RoleBinding,
    ) -> Result<(), Error> {
        self.apply(role_binding, namespace).await
    }

    async fn publish_event(
        &self,
        tenant: &Tenant,
        event_type: EventType,
        reason: &str,
        message: &str,
    ) -> Result<(), Error> {
        self.recorder
            .publish(
                &Event {
                    type_: event_type,
                    reason: reason.to_owned(),
                    note: Some(message.into()),
                    action: "Reconcile".into(),
                    secondary: None,
                },
                &tenant.object_ref(&()),
            )
            .await
            .context(RecordSnafu)
    }
}
