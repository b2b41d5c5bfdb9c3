//! Sample Service ids (`sample`).
//!
//! Saving an object that links a sample requires administrative rights on
//! that sample. ACLs are read with the workspace's Sample Service admin
//! token; the caller's user name is taken from their already-validated token.

use std::sync::Arc;

use idref_client::sample::SAMPLE_SERVICE_NAME;
use idref_client::{GetSampleAclsParams, JsonRpcError, SampleService, UpdateSampleAclsParams};
use idref_core::{
    AssociatedObject, AuthToken, DependencyStatus, IdCollector, IdReferenceError, IdReferenceHandler,
    IdReferenceHandlerError, IdReferenceHandlerFactory, IdReferencePermissionHandler,
    IdReferencePermissionHandlerFactory, IdReferenceType, PermissionHandlerError, ReadGrantee, RemapTable,
};

use crate::referencing_object;

/// Factory for `sample` handlers.
#[derive(Clone)]
pub struct SampleIdHandlerFactory {
    /// Bound to a token with Sample Service admin rights.
    client: Option<Arc<dyn SampleService>>,
}

impl SampleIdHandlerFactory {
    pub fn new(client: Arc<dyn SampleService>) -> Self {
        Self { client: Some(client) }
    }

    pub fn unconfigured() -> Self {
        Self { client: None }
    }
}

impl IdReferencePermissionHandlerFactory for SampleIdHandlerFactory {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::sample()
    }

    fn create_permission_handler(&self, grantee: &ReadGrantee) -> Box<dyn IdReferencePermissionHandler> {
        Box::new(SamplePermissionHandler {
            client: self.client.clone(),
            grantee: grantee.clone(),
        })
    }

    fn dependency_status(&self) -> Vec<DependencyStatus> {
        let Some(client) = &self.client else {
            return Vec::new();
        };
        let status = match client.version() {
            Ok(v) => DependencyStatus::healthy(SAMPLE_SERVICE_NAME, v),
            Err(e) => DependencyStatus::unhealthy(SAMPLE_SERVICE_NAME, e.to_string()),
        };
        vec![status]
    }
}

impl<T: AssociatedObject> IdReferenceHandlerFactory<T> for SampleIdHandlerFactory {
    fn create_handler(&self, token: &AuthToken) -> Box<dyn IdReferenceHandler<T>> {
        Box::new(SampleIdHandler {
            client: self.client.clone(),
            user: token.user_name().to_string(),
        })
    }
}

struct SampleIdHandler {
    client: Option<Arc<dyn SampleService>>,
    user: String,
}

impl<T: AssociatedObject> IdReferenceHandler<T> for SampleIdHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::sample()
    }

    fn validate_id(&self, associated_object: &T, id: &str, attributes: Option<&[String]>) -> Result<(), IdReferenceError> {
        if self.client.is_none() {
            return Err(IdReferenceError::new(
                format!(
                    "Found sample id {id}. The workspace service currently does not have a connection \
                     to the sample service and so cannot process objects containing sample IDs."
                ),
                IdReferenceType::sample(),
                associated_object,
                id,
                attributes.map(<[String]>::to_vec),
            ));
        }
        Ok(())
    }

    fn process_ids(&mut self, collected: &IdCollector<T>) -> Result<RemapTable, IdReferenceHandlerError> {
        let client = self.client.as_ref().ok_or_else(|| {
            IdReferenceHandlerError::handler(
                IdReferenceType::sample(),
                "The workspace is not currently connected to the Sample Service and cannot process Sample IDs.",
            )
        })?;
        let mut table = RemapTable::new();
        for id in collected.distinct_ids() {
            let per_id = |message: String| {
                IdReferenceError::new(message, IdReferenceType::sample(), referencing_object(collected, id), id, None)
            };
            let params = GetSampleAclsParams {
                id: id.clone(),
                as_admin: 1,
            };
            let acls = client.get_sample_acls(&params).map_err(|e| {
                let (prefix, per_type) = match &e {
                    JsonRpcError::Unauthorized { .. } => (
                        "Unable to contact the Sample Service - the Workspace credentials were rejected: ",
                        true,
                    ),
                    JsonRpcError::Transport { .. } => (
                        "There was a communication error while trying to contact the Sample Service: ",
                        true,
                    ),
                    JsonRpcError::Server { .. } => (
                        "The Sample Service reported a problem while attempting to get Sample ACLs: ",
                        false,
                    ),
                    _ => (
                        "There was an unexpected error while trying to contact the Sample Service: ",
                        true,
                    ),
                };
                let message = format!("{prefix}{e}");
                if per_type {
                    IdReferenceHandlerError::handler_with_source(IdReferenceType::sample(), message, e)
                } else {
                    per_id(message).with_source(e).into()
                }
            })?;
            if acls.owner != self.user && !acls.admin.contains(&self.user) {
                return Err(per_id(format!(
                    "User {} does not have administrative permissions for sample {}",
                    self.user, id
                ))
                .into());
            }
            table.insert_identity(id);
        }
        Ok(table)
    }
}

struct SamplePermissionHandler {
    client: Option<Arc<dyn SampleService>>,
    grantee: ReadGrantee,
}

impl IdReferencePermissionHandler for SamplePermissionHandler {
    fn id_type(&self) -> IdReferenceType {
        IdReferenceType::sample()
    }

    fn add_read_permission(&mut self, ids: &[String]) -> Result<(), PermissionHandlerError> {
        if ids.is_empty() {
            return Ok(());
        }
        let client = self.client.as_ref().ok_or_else(|| {
            PermissionHandlerError::new(
                "The workspace is not currently connected to the Sample Service and cannot process Sample IDs.",
            )
        })?;
        // One update per sample; the service has no bulk ACL call.
        for id in ids {
            let params = match &self.grantee {
                ReadGrantee::Public => UpdateSampleAclsParams::public_read(id.as_str()),
                ReadGrantee::User(user) => UpdateSampleAclsParams::grant_read(id.as_str(), user.as_str()),
            };
            client.update_sample_acls(&params).map_err(|e| {
                let message = match &e {
                    JsonRpcError::Transport { .. } => {
                        format!("There was an IO problem while attempting to set Sample ACLs: {e}")
                    }
                    JsonRpcError::Unauthorized { .. } => {
                        format!("Unable to contact the Sample Service - the Workspace credentials were rejected: {e}")
                    }
                    JsonRpcError::Server { .. } => {
                        format!("The Sample Service reported a problem while attempting to set Sample ACLs: {e}")
                    }
                    _ => format!(
                        "There was an unexpected problem while contacting the Sample Service to set Sample ACLs: {e}"
                    ),
                };
                PermissionHandlerError::with_source(message, e)
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use idref_client::mock::{MockRpcFailure, MockSampleService, SampleCall};
    use idref_client::SampleAcls;

    use super::*;

    fn acls(owner: &str, admin: &[&str]) -> SampleAcls {
        SampleAcls {
            owner: owner.into(),
            admin: admin.iter().map(|a| a.to_string()).collect(),
            ..SampleAcls::default()
        }
    }

    fn handler(mock: &MockSampleService, user: &str) -> Box<dyn IdReferenceHandler<String>> {
        SampleIdHandlerFactory::new(Arc::new(mock.clone())).create_handler(&AuthToken::new("tok", user).unwrap())
    }

    fn collect(pairs: &[(&str, &str)]) -> IdCollector<String> {
        let mut c = IdCollector::new();
        for (obj, id) in pairs {
            c.add(&obj.to_string(), id, None);
        }
        c
    }

    #[test]
    fn owner_and_admins_pass_once_per_sample() {
        let mock = MockSampleService::new();
        mock.add_sample("s1", acls("amy", &[]));
        mock.add_sample("s2", acls("carl", &["amy"]));
        let mut h = handler(&mock, "amy");

        let table = h
            .process_ids(&collect(&[("o1", "s1"), ("o2", "s1"), ("o2", "s2"), ("o3", "s2")]))
            .unwrap();

        assert_eq!(table.get("s2").unwrap().id(), "s2");
        assert_eq!(
            mock.calls(),
            vec![
                SampleCall::GetAcls(GetSampleAclsParams {
                    id: "s1".into(),
                    as_admin: 1
                }),
                SampleCall::GetAcls(GetSampleAclsParams {
                    id: "s2".into(),
                    as_admin: 1
                }),
            ]
        );
    }

    #[test]
    fn non_admin_is_rejected_per_id() {
        let mock = MockSampleService::new();
        mock.add_sample("s1", acls("carl", &["dora"]));
        let mut h = handler(&mock, "amy");
        let err = h.process_ids(&collect(&[("o7", "s1")])).unwrap_err();
        let per_id = err.as_reference_error().unwrap();
        assert_eq!(err.to_string(), "User amy does not have administrative permissions for sample s1");
        assert_eq!(per_id.associated_object(), "o7");
    }

    #[test]
    fn service_error_for_one_sample_is_per_id() {
        let mock = MockSampleService::new();
        let mut h = handler(&mock, "amy");
        let err = h.process_ids(&collect(&[("o1", "missing")])).unwrap_err();
        assert!(err.as_reference_error().is_some());
        assert_eq!(
            err.to_string(),
            "The Sample Service reported a problem while attempting to get Sample ACLs: \
             Sample service error code 50010 No such sample: missing"
        );
    }

    #[test]
    fn credential_failure_is_per_type() {
        let mock = MockSampleService::new();
        mock.fail_with(Some(MockRpcFailure::Unauthorized("token expired".into())));
        let mut h = handler(&mock, "amy");
        let err = h.process_ids(&collect(&[("o1", "s1")])).unwrap_err();
        assert!(err.as_reference_error().is_none());
        assert_eq!(
            err.to_string(),
            "Unable to contact the Sample Service - the Workspace credentials were rejected: token expired"
        );

        mock.fail_with(Some(MockRpcFailure::Unexpected("bad json".into())));
        let mut h = handler(&mock, "amy");
        let err = h.process_ids(&collect(&[("o1", "s1")])).unwrap_err();
        assert_eq!(
            err.to_string(),
            "There was an unexpected error while trying to contact the Sample Service: bad json"
        );
    }

    #[test]
    fn unconfigured_rejects_on_add() {
        let h: Box<dyn IdReferenceHandler<String>> =
            SampleIdHandlerFactory::unconfigured().create_handler(&AuthToken::new("tok", "amy").unwrap());
        let err = h.validate_id(&"o1".to_string(), "s1", None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Found sample id s1. The workspace service currently does not have a connection to the \
             sample service and so cannot process objects containing sample IDs."
        );
    }

    #[test]
    fn grants_one_update_per_sample() {
        let mock = MockSampleService::new();
        mock.add_sample("s1", acls("carl", &[]));
        mock.add_sample("s2", acls("carl", &[]));
        let f = SampleIdHandlerFactory::new(Arc::new(mock.clone()));

        f.create_permission_handler(&ReadGrantee::User("amy".into()))
            .add_read_permission(&["s1".to_string(), "s2".to_string()])
            .unwrap();
        f.create_permission_handler(&ReadGrantee::Public)
            .add_read_permission(&["s2".to_string()])
            .unwrap();

        assert_eq!(
            mock.calls(),
            vec![
                SampleCall::UpdateAcls(UpdateSampleAclsParams::grant_read("s1", "amy")),
                SampleCall::UpdateAcls(UpdateSampleAclsParams::grant_read("s2", "amy")),
                SampleCall::UpdateAcls(UpdateSampleAclsParams::public_read("s2")),
            ]
        );
        assert_eq!(mock.acls_of("s1").unwrap().read, vec!["amy"]);
        assert_eq!(mock.acls_of("s2").unwrap().public_read, 1);
    }

    #[test]
    fn grant_errors() {
        let mock = MockSampleService::new();
        let f = SampleIdHandlerFactory::new(Arc::new(mock.clone()));
        let err = f
            .create_permission_handler(&ReadGrantee::Public)
            .add_read_permission(&["nope".to_string()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The Sample Service reported a problem while attempting to set Sample ACLs: \
             Sample service error code 50010 No such sample: nope"
        );

        mock.fail_with(Some(MockRpcFailure::Unauthorized("no admin".into())));
        let err = f
            .create_permission_handler(&ReadGrantee::Public)
            .add_read_permission(&["s1".to_string()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unable to contact the Sample Service - the Workspace credentials were rejected: no admin"
        );

        let err = SampleIdHandlerFactory::unconfigured()
            .create_permission_handler(&ReadGrantee::Public)
            .add_read_permission(&["s1".to_string()])
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The workspace is not currently connected to the Sample Service and cannot process Sample IDs."
        );
    }

    #[test]
    fn empty_grant_makes_no_call() {
        let mock = MockSampleService::new();
        SampleIdHandlerFactory::new(Arc::new(mock.clone()))
            .create_permission_handler(&ReadGrantee::User("amy".into()))
            .add_read_permission(&[])
            .unwrap();
        assert!(mock.calls().is_empty());
    }

    #[test]
    fn dependency_status() {
        let mock = MockSampleService::new();
        let f = SampleIdHandlerFactory::new(Arc::new(mock.clone()));
        assert_eq!(
            IdReferencePermissionHandlerFactory::dependency_status(&f),
            vec![DependencyStatus::healthy("Sample service", "0.2.5")]
        );
        mock.fail_with(Some(MockRpcFailure::Unexpected("whoops2".into())));
        assert_eq!(
            IdReferencePermissionHandlerFactory::dependency_status(&f),
            vec![DependencyStatus::unhealthy("Sample service", "whoops2")]
        );
    }
}
