//! Deployment wiring: build every handler factory from configuration.

use std::sync::Arc;

use idref_client::{
    ExternalServicesConfig, HttpHandleClientFactory, HttpHandleService, HttpSampleService, HttpShockClientFactory,
    JsonRpcError, ShockClientFactory, ShockError,
};
use idref_core::{ArgumentError, AssociatedObject, AuthToken, IdReferenceHandlerSetFactoryBuilder};
use tracing::info;

use crate::bytestream::BytestreamIdHandlerFactory;
use crate::handle::HandleIdHandlerFactory;
use crate::sample::SampleIdHandlerFactory;
use crate::shock::ShockIdHandlerFactory;
use crate::workspace::{ObjectResolver, WorkspaceIdHandlerFactory};

/// A configured service client could not be created.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("could not set up the Handle Service client: {0}")]
    Handle(#[source] JsonRpcError),

    #[error("could not set up the Sample Service client: {0}")]
    Sample(#[source] JsonRpcError),

    #[error("could not set up the Shock client: {0}")]
    Shock(#[from] ShockError),

    #[error("invalid Shock credentials: {0}")]
    ShockCredentials(#[from] ArgumentError),
}

/// Register `handle`, `shock`, `bytestream` and `sample` factories
/// (unconfigured ones reject their ids) and, with a resolver, `ws`.
///
/// `shock` and `bytestream` share the `shock` connection and its workspace
/// account.
///
/// No service is contacted here.
pub fn factory_builder<T: AssociatedObject>(
    config: &ExternalServicesConfig,
    resolver: Option<Arc<dyn ObjectResolver>>,
) -> Result<IdReferenceHandlerSetFactoryBuilder<T>, RegistryError> {
    let timeout = config.timeout_secs;

    let handle = match &config.handle_service {
        Some(hs) => {
            let clients = HttpHandleClientFactory::new(hs.url.clone(), timeout).map_err(RegistryError::Handle)?;
            let admin = HttpHandleService::new(hs.url.clone(), Some(hs.token.as_str()), timeout)
                .map_err(RegistryError::Handle)?;
            HandleIdHandlerFactory::new(Arc::new(clients), Arc::new(admin))
        }
        None => HandleIdHandlerFactory::unconfigured(),
    };

    let (shock, bytestream) = match &config.shock {
        Some(sc) => {
            let clients: Arc<dyn ShockClientFactory> = Arc::new(HttpShockClientFactory::new(&sc.url, timeout)?);
            let admin = clients.with_token(&AuthToken::new(sc.token.as_str(), sc.user.as_str())?)?;
            info!(
                shock_user = %sc.user,
                "workspace Shock identity taken from configuration, not checked against the token"
            );
            (
                ShockIdHandlerFactory::new(clients.clone(), admin.clone()),
                BytestreamIdHandlerFactory::new(clients, admin),
            )
        }
        None => (ShockIdHandlerFactory::unconfigured(), BytestreamIdHandlerFactory::unconfigured()),
    };

    let sample = match &config.sample_service {
        Some(ss) => {
            let client = HttpSampleService::new(
                ss.url.clone(),
                ss.token.as_str(),
                ss.service_version.as_deref(),
                timeout,
            )
            .map_err(RegistryError::Sample)?;
            SampleIdHandlerFactory::new(Arc::new(client))
        }
        None => SampleIdHandlerFactory::unconfigured(),
    };

    info!(
        handle = config.handle_service.is_some(),
        shock = config.shock.is_some(),
        bytestream = config.shock.is_some(),
        sample = config.sample_service.is_some(),
        ws = resolver.is_some(),
        max_unique_ids = config.max_unique_ids,
        "registering id handlers"
    );

    let mut builder = IdReferenceHandlerSetFactoryBuilder::builder(config.max_unique_ids)
        .with_factory(handle)
        .with_factory(shock)
        .with_factory(bytestream)
        .with_factory(sample);
    if let Some(resolver) = resolver {
        builder = builder.with_factory(WorkspaceIdHandlerFactory::new(resolver));
    }
    Ok(builder.build())
}
