// ABOUTME: Routes store change notifications to controller queues.
// ABOUTME: Maintains the reference indices so a change reaches every dependent record.

use std::sync::Arc;

use super::index::Indices;
use super::queue::WorkQueue;
use crate::model::{
    ActionRef, Build, ContainerBuild, Deploy, Resource, ResourceKind, System, Teardown,
};
use crate::store::{Collection, Store, WatchEvent};
use crate::types::{BuildId, DeployId, SystemId, TeardownId};

/// Queues fed by the router.
pub struct Queues {
    pub builds: Arc<WorkQueue<BuildId>>,
    pub systems: Arc<WorkQueue<SystemId>>,
    pub deploys: Arc<WorkQueue<DeployId>>,
    pub teardowns: Arc<WorkQueue<TeardownId>>,
}

pub struct EventRouter {
    indices: Arc<Indices>,
    queues: Queues,
}

impl EventRouter {
    pub fn new(indices: Arc<Indices>, queues: Queues) -> Self {
        Self { indices, queues }
    }

    pub fn indices(&self) -> &Indices {
        &self.indices
    }

    pub fn container_build(&self, event: &WatchEvent<ContainerBuild>) {
        let cb = event.resource();
        let index = &self.indices.builds_by_container_build;
        for owner in cb.meta.owners.iter().filter(|o| o.kind == ResourceKind::Build) {
            index.insert(cb.id().clone(), BuildId::new(owner.id.clone()));
        }
        for build in index.dependents(cb.id()) {
            self.queues.builds.add(build);
        }
    }

    pub fn build(&self, event: &WatchEvent<Build>) {
        let build = event.resource();
        let id = build.id();

        if let WatchEvent::Deleted(_) = event {
            self.indices.builds_by_container_build.remove_value(id);
        } else {
            self.indices
                .builds_by_container_build
                .insert_all(build.status.referenced_container_builds(), id);
            self.queues.builds.add(id.clone());
        }

        for deploy in self.indices.deploys_by_build.dependents(id) {
            self.queues.deploys.add(deploy);
        }
        for owner in build.meta.owners.iter().filter(|o| o.kind == ResourceKind::Deploy) {
            self.queues.deploys.add(DeployId::new(owner.id.clone()));
        }
    }

    pub fn system(&self, event: &WatchEvent<System>) {
        let system = event.resource();
        let id = system.id();
        if !matches!(event, WatchEvent::Deleted(_)) {
            self.queues.systems.add(id.clone());
        }

        for deploy in self.indices.deploys_by_system.dependents(id) {
            self.queues.deploys.add(deploy);
        }
        for teardown in self.indices.teardowns_by_system.dependents(id) {
            self.queues.teardowns.add(teardown);
        }
        // A finished holder may still need to let go of the claim.
        match system.claimed_by() {
            Some(ActionRef::Deploy(deploy)) => self.queues.deploys.add(deploy.clone()),
            Some(ActionRef::Teardown(teardown)) => self.queues.teardowns.add(teardown.clone()),
            None => {}
        }
    }

    pub fn deploy(&self, event: &WatchEvent<Deploy>) {
        let deploy = event.resource();
        let id = deploy.id();
        let deleted = matches!(event, WatchEvent::Deleted(_));

        if deleted || deploy.status.state.is_terminal() {
            self.indices.deploys_by_system.remove_value(id);
            self.indices.deploys_by_build.remove_value(id);
        } else {
            self.indices
                .deploys_by_system
                .insert(deploy.spec.system.clone(), id.clone());
            if let Some(build) = deploy.status.build.as_ref().or(deploy.spec.build.as_ref()) {
                self.indices.deploys_by_build.insert(build.clone(), id.clone());
            }
        }

        if !deleted {
            self.queues.deploys.add(id.clone());
        }
    }

    pub fn teardown(&self, event: &WatchEvent<Teardown>) {
        let teardown = event.resource();
        let id = teardown.id();
        let deleted = matches!(event, WatchEvent::Deleted(_));

        if deleted || teardown.status.state.is_terminal() {
            self.indices.teardowns_by_system.remove_value(id);
        } else {
            self.indices
                .teardowns_by_system
                .insert(teardown.spec.system.clone(), id.clone());
        }

        if !deleted {
            self.queues.teardowns.add(id.clone());
        }
    }
}

/// A record kind the router knows how to dispatch.
pub trait Routed: Resource {
    fn collection(store: &dyn Store) -> &dyn Collection<Self>;

    fn route(router: &EventRouter, event: &WatchEvent<Self>);
}

impl Routed for ContainerBuild {
    fn collection(store: &dyn Store) -> &dyn Collection<Self> {
        store.container_builds()
    }

    fn route(router: &EventRouter, event: &WatchEvent<Self>) {
        router.container_build(event);
    }
}

impl Routed for Build {
    fn collection(store: &dyn Store) -> &dyn Collection<Self> {
        store.builds()
    }

    fn route(router: &EventRouter, event: &WatchEvent<Self>) {
        router.build(event);
    }
}

impl Routed for System {
    fn collection(store: &dyn Store) -> &dyn Collection<Self> {
        store.systems()
    }

    fn route(router: &EventRouter, event: &WatchEvent<Self>) {
        router.system(event);
    }
}

impl Routed for Deploy {
    fn collection(store: &dyn Store) -> &dyn Collection<Self> {
        store.deploys()
    }

    fn route(router: &EventRouter, event: &WatchEvent<Self>) {
        router.deploy(event);
    }
}

impl Routed for Teardown {
    fn collection(store: &dyn Store) -> &dyn Collection<Self> {
        store.teardowns()
    }

    fn route(router: &EventRouter, event: &WatchEvent<Self>) {
        router.teardown(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::backoff::Backoff;
    use crate::model::{
        BuildSpec, ContainerBuildDefinition, ContainerBuildRefs, DeployState, OwnerRef,
    };
    use crate::types::{ContainerBuildId, ContentHash, HashWidth, ServicePath};
    use std::collections::BTreeMap;

    fn new_router() -> EventRouter {
        fn queue<K>(name: &'static str) -> Arc<WorkQueue<K>>
        where
            K: Clone + Eq + std::hash::Hash + Send + Sync + 'static,
        {
            Arc::new(WorkQueue::new(name, Backoff::default()))
        }
        EventRouter::new(
            Arc::new(Indices::default()),
            Queues {
                builds: queue("builds"),
                systems: queue("systems"),
                deploys: queue("deploys"),
                teardowns: queue("teardowns"),
            },
        )
    }

    fn container_build(id: &str, owner: &str) -> ContainerBuild {
        let def = ContainerBuildDefinition::image("nginx:1.27");
        let hash = ContentHash::compute(&def, HashWidth::default()).unwrap();
        ContainerBuild::new(
            ContainerBuildId::new(id),
            def,
            &hash,
            &SystemId::new("petstore"),
            OwnerRef::new(ResourceKind::Build, &BuildId::new(owner)),
        )
    }

    #[test]
    fn container_build_change_reaches_every_dependent_build() {
        let indices = Arc::new(Indices::default());
        // b2 references cb1 through its status; b1 created cb1 (owner reference).
        let mut build = Build::new(
            BuildId::new("b2"),
            BuildSpec {
                system: SystemId::new("petstore"),
                version: None,
                services: BTreeMap::new(),
                jobs: BTreeMap::new(),
            },
        );
        build.status.services.insert(
            ServicePath::new("/petstore/web").unwrap(),
            ContainerBuildRefs {
                main: ContainerBuildId::new("cb1"),
                sidecars: BTreeMap::new(),
            },
        );
        router_with(Arc::clone(&indices)).build(&WatchEvent::Modified(build));

        let router = router_with(Arc::clone(&indices));
        router.container_build(&WatchEvent::Modified(container_build("cb1", "b1")));

        let mut dependents = indices
            .builds_by_container_build
            .dependents(&ContainerBuildId::new("cb1"));
        dependents.sort();
        assert_eq!(dependents, vec![BuildId::new("b1"), BuildId::new("b2")]);
        assert_eq!(router.queues.builds.len(), 2);
    }

    fn router_with(indices: Arc<Indices>) -> EventRouter {
        EventRouter::new(indices, new_router().queues)
    }

    #[test]
    fn terminal_deploys_leave_the_system_index() {
        let router = new_router();
        let mut deploy = Deploy::for_build(
            DeployId::new("d1"),
            SystemId::new("petstore"),
            BuildId::new("b1"),
        );
        router.deploy(&WatchEvent::Added(deploy.clone()));
        assert!(
            router
                .indices
                .deploys_by_system
                .contains(&SystemId::new("petstore"), &DeployId::new("d1"))
        );
        assert!(
            router
                .indices
                .deploys_by_build
                .contains(&BuildId::new("b1"), &DeployId::new("d1"))
        );

        deploy.status.state = DeployState::Succeeded;
        router.deploy(&WatchEvent::Modified(deploy));
        assert!(
            !router
                .indices
                .deploys_by_system
                .contains(&SystemId::new("petstore"), &DeployId::new("d1"))
        );
    }

    #[test]
    fn system_change_wakes_waiting_actions_and_claim_holder() {
        let router = new_router();
        router.deploy(&WatchEvent::Added(Deploy::for_build(
            DeployId::new("d2"),
            SystemId::new("petstore"),
            BuildId::new("b1"),
        )));
        router.teardown(&WatchEvent::Added(Teardown::new(
            TeardownId::new("t1"),
            SystemId::new("petstore"),
        )));
        // Drain the adds from the action events themselves.
        let drained = router_with(Arc::clone(&router.indices));

        let mut system = System::new(SystemId::new("petstore"));
        system.claim = Some(crate::model::LifecycleClaim::new(ActionRef::Deploy(
            DeployId::new("d1"),
        )));
        drained.system(&WatchEvent::Modified(system));

        assert_eq!(drained.queues.systems.len(), 1);
        assert_eq!(drained.queues.deploys.len(), 2);
        assert_eq!(drained.queues.teardowns.len(), 1);
    }
}
