//! # Save and Read Flows Across All ID Types
//!
//! Drives a full handler set over the in-memory service doubles the way the
//! object store does: collect every reference while validating, process once,
//! persist the remapped and extracted ids, and on read propagate permissions
//! to the reader.

use std::sync::Arc;

use idref_client::mock::{HandleCall, MockHandleService, MockSampleService, MockShock, SampleCall, ShockCall};
use idref_client::{SampleAcls, ShockNodeId};
use idref_core::{
    propagate_read_permissions, propagate_read_permissions_for_objects, AuthToken, CarriesExternalIds,
    ExternalIdError, ExtractedIds, IdRefError, IdReference, IdReferenceHandlerSetFactoryBuilder, IdReferenceType,
    ReadGrantee,
};
use idref_handlers::{BytestreamIdHandlerFactory, HandleIdHandlerFactory, SampleIdHandlerFactory, ShockIdHandlerFactory};

const WS: &str = "wsadmin";

struct Services {
    handle: MockHandleService,
    shock: MockShock,
    sample: MockSampleService,
}

impl Services {
    fn new() -> Self {
        let shock = MockShock::new();
        shock.add_admin(WS);
        Self {
            handle: MockHandleService::new(),
            shock,
            sample: MockSampleService::new(),
        }
    }

    fn registry(&self, max: usize) -> IdReferenceHandlerSetFactoryBuilder<String> {
        IdReferenceHandlerSetFactoryBuilder::builder(max)
            .with_factory(HandleIdHandlerFactory::new(
                Arc::new(self.handle.clone()),
                Arc::new(self.handle.clone()),
            ))
            .with_factory(ShockIdHandlerFactory::new(
                Arc::new(self.shock.clone()),
                self.shock.client(WS),
            ))
            .with_factory(BytestreamIdHandlerFactory::new(
                Arc::new(self.shock.clone()),
                self.shock.client(WS),
            ))
            .with_factory(SampleIdHandlerFactory::new(Arc::new(self.sample.clone())))
            .build()
    }
}

fn token(user: &str) -> AuthToken {
    AuthToken::new(format!("{user}-token"), user).unwrap()
}

fn reference(id_type: IdReferenceType, obj: &str, id: &str) -> IdReference<String> {
    IdReference::new(id_type, obj.to_string(), id, None).unwrap()
}

#[test]
fn each_distinct_id_resolved_once_per_type() {
    let svc = Services::new();
    svc.handle.add_readable(&["KBH_1", "KBH_2"]);
    let node = svc.shock.add_node("amy");
    svc.sample.add_sample(
        "s1",
        SampleAcls {
            owner: "amy".into(),
            ..SampleAcls::default()
        },
    );

    let mut set = svc.registry(100).factory(token("amy")).create_handlers();
    for obj in ["o1", "o2", "o3"] {
        for _ in 0..2 {
            set.add_id(&reference(IdReferenceType::handle(), obj, "KBH_1")).unwrap();
            set.add_id(&reference(IdReferenceType::shock(), obj, node.as_str())).unwrap();
            set.add_id(&reference(IdReferenceType::sample(), obj, "s1")).unwrap();
        }
    }
    set.add_id(&reference(IdReferenceType::handle(), "o3", "KBH_2")).unwrap();
    assert_eq!(set.size(), 10);

    set.process_ids().unwrap();
    set.process_ids().unwrap();

    assert_eq!(
        svc.handle.calls(),
        vec![HandleCall::AreReadable {
            user: Some("amy".into()),
            handles: vec!["KBH_1".into(), "KBH_2".into()],
        }]
    );
    let shock_calls = svc.shock.calls();
    assert_eq!(shock_calls.iter().filter(|c| matches!(c, ShockCall::Acl { .. })).count(), 1);
    assert_eq!(shock_calls.iter().filter(|c| matches!(c, ShockCall::Copy { .. })).count(), 1);
    assert_eq!(svc.sample.calls().len(), 1);

    let copy = set.remapped_id(&IdReferenceType::shock(), node.as_str()).unwrap();
    for obj in ["o1", "o2", "o3"] {
        let ids = set.remapped_ids(&IdReferenceType::shock(), &obj.to_string()).unwrap();
        assert_eq!(ids.into_iter().collect::<Vec<_>>(), vec![copy.clone()]);
    }
}

#[test]
fn save_then_read_then_resave() {
    let svc = Services::new();
    let node = svc.shock.add_node("amy");
    let registry = svc.registry(100);

    // Save: amy's node is copied into workspace ownership.
    let mut save = registry.factory(token("amy")).create_handlers();
    save.add_id(&reference(IdReferenceType::shock(), "obj", node.as_str())).unwrap();
    save.process_ids().unwrap();
    let stored: ExtractedIds = save.extracted_ids_for(&"obj".to_string()).unwrap();
    let copy = stored[&IdReferenceType::shock()][0].clone();
    assert_ne!(copy, node.as_str());

    // Read by bob: bob is granted read on the copy, not on amy's node.
    let mut perms = registry.create_permission_handler(ReadGrantee::User("bob".into()));
    assert_eq!(propagate_read_permissions(&mut perms, &stored), None);
    let copy_node = ShockNodeId::new(&copy).unwrap();
    assert!(svc.shock.acl_of(&copy_node).unwrap().read.contains(&"bob".to_string()));
    assert!(!svc.shock.acl_of(&node).unwrap().read.contains(&"bob".to_string()));

    // bob saves the object he read: the copy is already owned, nothing new is copied.
    let mut resave = registry.factory(token("bob")).create_handlers();
    resave.add_id(&reference(IdReferenceType::shock(), "obj2", &copy)).unwrap();
    resave.process_ids().unwrap();
    assert_eq!(
        resave.remapped_id(&IdReferenceType::shock(), &copy).unwrap().id(),
        copy
    );
    let copies = svc
        .shock
        .calls()
        .into_iter()
        .filter(|c| matches!(c, ShockCall::Copy { .. }))
        .count();
    assert_eq!(copies, 1);
}

#[test]
fn shock_ids_are_copied_and_bytestream_ids_change_owner() {
    let svc = Services::new();
    let copied = svc.shock.add_node("amy");
    let owned = svc.shock.add_node("amy");
    let registry = svc.registry(100);

    let mut save = registry.factory(token("amy")).create_handlers();
    save.add_id(&reference(IdReferenceType::shock(), "obj", copied.as_str())).unwrap();
    save.add_id(&reference(IdReferenceType::bytestream(), "obj", owned.as_str())).unwrap();
    save.process_ids().unwrap();

    let stored = save.extracted_ids_for(&"obj".to_string()).unwrap();
    assert_ne!(stored[&IdReferenceType::shock()], vec![copied.to_string()]);
    assert_eq!(stored[&IdReferenceType::bytestream()], vec![owned.to_string()]);
    assert_eq!(svc.shock.acl_of(&copied).unwrap().owner, "amy");
    assert_eq!(svc.shock.acl_of(&owned).unwrap().owner, WS);

    let mut perms = registry.create_permission_handler(ReadGrantee::User("bob".into()));
    assert_eq!(propagate_read_permissions(&mut perms, &stored), None);
    assert!(svc.shock.acl_of(&owned).unwrap().read.contains(&"bob".to_string()));
}

#[test]
fn empty_grants_touch_no_service() {
    let svc = Services::new();
    let registry = svc.registry(10);
    for grantee in [ReadGrantee::Public, ReadGrantee::User("bob".into())] {
        let mut perms = registry.create_permission_handler(grantee);
        for t in [
            IdReferenceType::handle(),
            IdReferenceType::shock(),
            IdReferenceType::bytestream(),
            IdReferenceType::sample(),
        ] {
            perms.add_read_permission(&t, &[]).unwrap();
        }
        assert_eq!(propagate_read_permissions(&mut perms, &ExtractedIds::new()), None);
    }
    assert!(svc.handle.calls().is_empty());
    assert!(svc.shock.calls().is_empty());
    assert!(svc.sample.calls().is_empty());
}

struct ReadResult {
    ids: ExtractedIds,
    error: Option<ExternalIdError>,
}

impl CarriesExternalIds for ReadResult {
    fn extracted_ids(&self) -> &ExtractedIds {
        &self.ids
    }

    fn set_external_id_error(&mut self, error: ExternalIdError) {
        self.error = Some(error);
    }
}

#[test]
fn bulk_read_degrades_per_object() {
    let svc = Services::new();
    svc.sample.add_sample("s1", SampleAcls::default());
    let registry = svc.registry(10);

    let one = |t: IdReferenceType, id: &str| ReadResult {
        ids: [(t, vec![id.to_string()])].into_iter().collect(),
        error: None,
    };
    let mut objects = vec![
        one(IdReferenceType::sample(), "s1"),
        one(IdReferenceType::sample(), "gone"),
        one(IdReferenceType::handle(), "KBH_5"),
    ];

    let mut perms = registry.create_permission_handler(ReadGrantee::Public);
    let failed = propagate_read_permissions_for_objects(&mut perms, &mut objects);

    assert_eq!(failed, 1);
    assert!(objects[0].error.is_none());
    let err = objects[1].error.as_ref().unwrap();
    assert_eq!(
        err.error,
        "The Sample Service reported a problem while attempting to set Sample ACLs: \
         Sample service error code 50010 No such sample: gone"
    );
    assert_eq!(err.trace[1], "Sample service error code 50010 No such sample: gone");
    assert!(objects[2].error.is_none());
    assert!(svc.handle.is_public("KBH_5"));
    assert!(svc
        .sample
        .calls()
        .contains(&SampleCall::UpdateAcls(idref_client::UpdateSampleAclsParams::public_read("s1"))));
}

#[test]
fn capacity_counts_pairs_across_types() {
    let svc = Services::new();
    let mut set = svc.registry(3).factory(token("amy")).create_handlers();
    assert!(set.add_id(&reference(IdReferenceType::handle(), "o1", "KBH_1")).unwrap());
    assert!(set.add_id(&reference(IdReferenceType::sample(), "o1", "s1")).unwrap());
    assert!(set.add_id(&reference(IdReferenceType::sample(), "o2", "s1")).unwrap());
    assert!(!set.add_id(&reference(IdReferenceType::sample(), "o2", "s1")).unwrap());

    let err = set.add_id(&reference(IdReferenceType::handle(), "o2", "KBH_1")).unwrap_err();
    assert!(matches!(err, IdRefError::TooManyIds(_)));
    assert_eq!(err.to_string(), "Maximum ID count of 3 exceeded");
    assert_eq!(set.size(), 3);
}

#[test]
fn per_type_failure_aborts_the_call() {
    let svc = Services::new();
    let mut set = svc.registry(10).factory(token("amy")).create_handlers();
    set.add_id(&reference(IdReferenceType::handle(), "o1", "KBH_404")).unwrap();
    let err = set.process_ids().unwrap_err();
    assert!(err
        .to_string()
        .starts_with("The Handle Service reported that at least one of the handles"));
    assert!(!set.were_ids_processed());
    assert!(set.process_ids().is_err());
}
