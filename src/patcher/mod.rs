//! Manifest rewriting for repackaged builds.
//!
//! Both entry points run `decoder -> stages -> encoder` on a fresh chain per
//! call, so a [`ManifestPatcher`] can be shared freely between threads.

pub mod stages;

use crate::android::{decode, AxmlEncoder, AxmlResult};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use stages::{
    ApplicationStage, AttributeRules, NamespaceStage, PermissionStage, RootAttributeStage,
    UsesSdkStage,
};

pub const PACKAGE: &str = "package";
pub const COMPILE_SDK_VERSION: &str = "compileSdkVersion";
pub const COMPILE_SDK_VERSION_CODENAME: &str = "compileSdkVersionCodename";

pub const PATCHED_COMPILE_SDK_VERSION: i32 = 23;
pub const PATCHED_COMPILE_SDK_VERSION_CODENAME: &str = "6.0-2438415";

pub const READ_EXTERNAL_STORAGE: &str = "android.permission.READ_EXTERNAL_STORAGE";
pub const MANAGE_EXTERNAL_STORAGE: &str = "android.permission.MANAGE_EXTERNAL_STORAGE";

/// Knowledge about the device the patched app will be installed on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformConfig {
    /// `Build.VERSION.SDK_INT` of the target device.
    pub sdk_int: u32,
    pub read_external_storage: String,
    pub manage_external_storage: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        PlatformConfig {
            sdk_int: 33,
            read_external_storage: READ_EXTERNAL_STORAGE.to_string(),
            manage_external_storage: MANAGE_EXTERNAL_STORAGE.to_string(),
        }
    }
}

impl PlatformConfig {
    pub fn with_sdk_int(sdk_int: u32) -> Self {
        PlatformConfig {
            sdk_int,
            ..PlatformConfig::default()
        }
    }

    /// `targetSdkVersion` written into `uses-sdk`.
    pub fn target_sdk_version(&self) -> i32 {
        if self.sdk_int >= 31 {
            30
        } else {
            28
        }
    }

    /// `requestLegacyExternalStorage` only exists from API 29 on.
    pub fn legacy_storage_supported(&self) -> bool {
        self.sdk_int >= 29
    }
}

#[derive(Clone, Debug, Default)]
pub struct ManifestPatcher {
    config: PlatformConfig,
}

impl ManifestPatcher {
    pub fn new(config: PlatformConfig) -> Self {
        ManifestPatcher { config }
    }

    pub fn config(&self) -> &PlatformConfig {
        &self.config
    }

    /// Renames the package and application, pins SDK metadata, relaxes
    /// storage and network restrictions, and sets the debuggable flag.
    pub fn patch_manifest(
        &self,
        manifest: &[u8],
        package_name: &str,
        app_name: &str,
        debuggable: bool,
    ) -> AxmlResult<Vec<u8>> {
        info!("Patching manifest for {} ({})", package_name, app_name);
        let mut encoder = AxmlEncoder::new();
        {
            let application = ApplicationStage::new(
                &mut encoder,
                app_name,
                package_name,
                debuggable,
                self.config.legacy_storage_supported(),
            );
            let sdk = UsesSdkStage::new(application, self.config.target_sdk_version());
            let permissions = PermissionStage::new(
                sdk,
                self.config.read_external_storage.as_str(),
                self.config.manage_external_storage.as_str(),
            );
            let root = RootAttributeStage::new(
                permissions,
                AttributeRules::new()
                    .with(PACKAGE, package_name)
                    .with(COMPILE_SDK_VERSION, PATCHED_COMPILE_SDK_VERSION)
                    .with(COMPILE_SDK_VERSION_CODENAME, PATCHED_COMPILE_SDK_VERSION_CODENAME),
            );
            let mut chain = NamespaceStage::new(root);
            decode(manifest, &mut chain)?;
        }
        let patched = encoder.to_bytes()?;
        debug!("Patched manifest: {} -> {} bytes", manifest.len(), patched.len());
        Ok(patched)
    }

    /// Changes only the root `package` attribute.
    pub fn rename_package(&self, manifest: &[u8], package_name: &str) -> AxmlResult<Vec<u8>> {
        info!("Renaming manifest package to {}", package_name);
        let mut encoder = AxmlEncoder::new();
        {
            let mut chain =
                RootAttributeStage::new(&mut encoder, AttributeRules::new().with(PACKAGE, package_name));
            decode(manifest, &mut chain)?;
        }
        encoder.to_bytes()
    }
}

/// [`ManifestPatcher::patch_manifest`] with the default [`PlatformConfig`].
pub fn patch_manifest(
    manifest: &[u8],
    package_name: &str,
    app_name: &str,
    debuggable: bool,
) -> AxmlResult<Vec<u8>> {
    ManifestPatcher::default().patch_manifest(manifest, package_name, app_name, debuggable)
}

/// [`ManifestPatcher::rename_package`] with the default [`PlatformConfig`].
pub fn rename_package(manifest: &[u8], package_name: &str) -> AxmlResult<Vec<u8>> {
    ManifestPatcher::default().rename_package(manifest, package_name)
}
