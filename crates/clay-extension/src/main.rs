//! Clay Extension
//!
//! Background tunnel process: serves the control channel over the shared
//! store and drives the tunnel session controller.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clay_control::{ControlResponder, JsonFileStore, LocalSignal};
use clay_tunnel::{ExtensionProvider, NetworkSettingsSnapshot, TunnelError, TunnelHandle, TunnelHost};

/// Shared store location; override with `CLAY_STORE`.
const DEFAULT_STORE_PATH: &str = "clay-store.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clay_extension=info,clay_tunnel=info,clay_control=info".into()),
        )
        .init();

    // Shared store
    let store_path =
        std::env::var("CLAY_STORE").unwrap_or_else(|_| DEFAULT_STORE_PATH.to_string());
    let store = Arc::new(JsonFileStore::new(&store_path));
    tracing::info!("Shared store at: {}", store_path);

    // Controller and provider
    let tunnel = TunnelHandle::spawn(build_engine(), LoggingHost);
    let provider = ExtensionProvider::new(tunnel, store.clone());

    // Bring the tunnel up if a configuration document is already stashed
    match provider.start_from_store().await {
        Ok(()) => tracing::info!("Tunnel session running"),
        Err(TunnelError::Config(reason)) => {
            tracing::info!("No usable stored configuration ({}), waiting for commands", reason);
        }
        Err(e) => tracing::error!("Tunnel start failed: {}", e),
    }

    // Serve the control channel until shutdown
    let responder = ControlResponder::new(store, LocalSignal::new());
    tokio::select! {
        _ = responder.run(&provider) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutting down");
        }
    }

    provider.tunnel().stop().await?;
    Ok(())
}

#[cfg(feature = "native-engine")]
fn build_engine() -> clay_engine::NativeEngine {
    clay_engine::NativeEngine::new(native::api())
}

#[cfg(not(feature = "native-engine"))]
fn build_engine() -> clay_engine::MockEngine {
    tracing::warn!("Built without native-engine; packets will not be forwarded");
    clay_engine::MockEngine::new()
}

/// Host that records settings in the log only. Outside the platform
/// packet-tunnel extension there is no interface to configure and no
/// descriptor to hand over.
struct LoggingHost;

impl TunnelHost for LoggingHost {
    fn apply_settings(
        &self,
        snapshot: &NetworkSettingsSnapshot,
    ) -> impl Future<Output = Result<(), String>> + Send {
        tracing::info!(
            "Interface settings: ipv4={:?} ipv6={:?} dns={:?} mtu={}",
            snapshot.ipv4_addresses,
            snapshot.ipv6_addresses,
            snapshot.dns_servers,
            snapshot.mtu
        );
        async { Ok(()) }
    }

    fn tun_fd(&self) -> Option<std::os::fd::RawFd> {
        None
    }
}

/// Exported symbols of the native mesh engine library.
#[cfg(feature = "native-engine")]
mod native {
    use std::ffi::{c_char, c_int};

    use clay_engine::EngineApi;

    unsafe extern "C" {
        fn run_network_instance(cfg: *const c_char, err: *mut *const c_char) -> c_int;
        fn stop_network_instance() -> c_int;
        fn set_tun_fd(fd: c_int, err: *mut *const c_char) -> c_int;
        fn get_latest_error_msg(msg: *mut *const c_char, err: *mut *const c_char) -> c_int;
        fn get_running_info(info: *mut *const c_char, err: *mut *const c_char) -> c_int;
        fn register_stop_callback(cb: Option<extern "C" fn()>, err: *mut *const c_char) -> c_int;
        fn register_running_info_callback(
            cb: Option<extern "C" fn()>,
            err: *mut *const c_char,
        ) -> c_int;
        fn free_string(s: *const c_char);
    }

    pub fn api() -> EngineApi {
        EngineApi {
            run_network_instance,
            stop_network_instance,
            set_tun_fd,
            get_latest_error_msg,
            get_running_info,
            register_stop_callback,
            register_running_info_callback,
            free_string,
        }
    }
}
