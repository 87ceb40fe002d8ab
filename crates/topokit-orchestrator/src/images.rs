//! Image naming and build-if-absent.
//!
//! Image names are `{product}_{build}.{os dir}` with the OS directory
//! lower-cased, e.g. `couchbase_4.5.0-2601.ubuntu14`. A missing image is
//! built from `containers/<product dir>/<OsDir>/` under the config root.
//! Build problems never stop a launch; they are logged and the engine
//! reports its own failure if the image is unusable.

use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::build_args::{build_args_for_gateway_version, build_args_for_version};
use crate::container::ImageBuild;
use crate::manager::ContainerManager;
use crate::options::{OsFamily, ProviderOptions};
use topokit_core::NodeRole;

/// Image product name for server nodes.
pub const SERVER_PRODUCT: &str = "couchbase";

/// Image product name for gateway nodes.
pub const GATEWAY_PRODUCT: &str = "sync_gateway";

const SERVER_CONTEXT_ROOT: &str = "containers/couchbase";
const GATEWAY_CONTEXT_ROOT: &str = "containers/syncgateway";

/// Returns the image name for a product build on an OS family.
///
/// # Examples
///
/// ```
/// use topokit_orchestrator::images::image_name;
/// use topokit_orchestrator::options::OsFamily;
///
/// assert_eq!(
///     image_name("couchbase", "4.5.0-2601", OsFamily::CentOs),
///     "couchbase_4.5.0-2601.centos7"
/// );
/// ```
pub fn image_name(product: &str, build: &str, os: OsFamily) -> String {
    format!("{product}_{build}.{}", os.context_dir().to_lowercase())
}

/// Resolves and builds node images.
#[derive(Debug, Clone)]
pub struct ImageResolver {
    root: PathBuf,
}

impl ImageResolver {
    /// Creates a resolver with build contexts under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the image name for a role.
    pub fn image_for(&self, role: NodeRole, options: &ProviderOptions) -> String {
        match role {
            NodeRole::Server => image_name(SERVER_PRODUCT, &options.build, options.os),
            NodeRole::Gateway => image_name(GATEWAY_PRODUCT, &options.gateway_version, options.os),
        }
    }

    /// Returns the build context directory for a role.
    pub fn context_for(&self, role: NodeRole, os: OsFamily) -> PathBuf {
        let product_dir = match role {
            NodeRole::Server => SERVER_CONTEXT_ROOT,
            NodeRole::Gateway => GATEWAY_CONTEXT_ROOT,
        };
        self.root.join(product_dir).join(os.context_dir())
    }

    /// Returns the image for a role, building it first if it is absent.
    ///
    /// Never fails: build argument and build errors are logged as warnings
    /// and the image name is returned regardless.
    pub async fn ensure(
        &self,
        manager: &dyn ContainerManager,
        role: NodeRole,
        options: &ProviderOptions,
    ) -> String {
        let name = self.image_for(role, options);

        match manager.image_exists(&name).await {
            Ok(true) => {
                debug!(image = %name, "Image exists");
                return name;
            }
            Ok(false) => {}
            Err(e) => warn!(image = %name, error = %e, "Image lookup failed, building"),
        }

        let build_args = match role {
            NodeRole::Server => build_args_for_version(options),
            NodeRole::Gateway => build_args_for_gateway_version(options),
        };
        let build_args = match build_args {
            Ok(args) => args,
            Err(e) => {
                warn!(image = %name, error = %e, "Skipping image build");
                return name;
            }
        };

        let build = ImageBuild {
            name: name.clone(),
            context_dir: self.context_for(role, options.os),
            build_args,
        };

        match manager.build_image(&build).await {
            Ok(()) => info!(image = %name, "Image ready"),
            Err(e) => warn!(image = %name, error = %e, "Image build failed"),
        }
        name
    }
}
