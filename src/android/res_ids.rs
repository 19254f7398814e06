//! Well-known `android.R.attr` resource ids of manifest attributes.

use once_cell::sync::Lazy;
use std::collections::HashMap;

pub const ANDROID_NAMESPACE_URI: &str = "http://schemas.android.com/apk/res/android";

pub(crate) const ATTR_LABEL: u32 = 0x0101_0001;
pub(crate) const ATTR_ICON: u32 = 0x0101_0002;
pub(crate) const ATTR_NAME: u32 = 0x0101_0003;
pub(crate) const ATTR_DEBUGGABLE: u32 = 0x0101_000f;
pub(crate) const ATTR_EXPORTED: u32 = 0x0101_0010;
pub(crate) const ATTR_AUTHORITIES: u32 = 0x0101_0018;
pub(crate) const ATTR_VALUE: u32 = 0x0101_0024;
pub(crate) const ATTR_MIN_SDK_VERSION: u32 = 0x0101_020c;
pub(crate) const ATTR_VERSION_CODE: u32 = 0x0101_021b;
pub(crate) const ATTR_VERSION_NAME: u32 = 0x0101_021c;
pub(crate) const ATTR_TARGET_SDK_VERSION: u32 = 0x0101_0270;
pub(crate) const ATTR_MAX_SDK_VERSION: u32 = 0x0101_0271;
pub(crate) const ATTR_ALLOW_BACKUP: u32 = 0x0101_0280;
pub(crate) const ATTR_VM_SAFE_MODE: u32 = 0x0101_02b8;
pub(crate) const ATTR_USES_CLEARTEXT_TRAFFIC: u32 = 0x0101_04ec;
pub(crate) const ATTR_NETWORK_SECURITY_CONFIG: u32 = 0x0101_0527;
pub(crate) const ATTR_COMPILE_SDK_VERSION: u32 = 0x0101_0572;
pub(crate) const ATTR_COMPILE_SDK_VERSION_CODENAME: u32 = 0x0101_0573;
pub(crate) const ATTR_REQUEST_LEGACY_EXTERNAL_STORAGE: u32 = 0x0101_0603;

static ATTRIBUTE_IDS: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    HashMap::from([
        ("label", ATTR_LABEL),
        ("icon", ATTR_ICON),
        ("name", ATTR_NAME),
        ("debuggable", ATTR_DEBUGGABLE),
        ("exported", ATTR_EXPORTED),
        ("authorities", ATTR_AUTHORITIES),
        ("value", ATTR_VALUE),
        ("minSdkVersion", ATTR_MIN_SDK_VERSION),
        ("versionCode", ATTR_VERSION_CODE),
        ("versionName", ATTR_VERSION_NAME),
        ("targetSdkVersion", ATTR_TARGET_SDK_VERSION),
        ("maxSdkVersion", ATTR_MAX_SDK_VERSION),
        ("allowBackup", ATTR_ALLOW_BACKUP),
        ("vmSafeMode", ATTR_VM_SAFE_MODE),
        ("usesCleartextTraffic", ATTR_USES_CLEARTEXT_TRAFFIC),
        ("networkSecurityConfig", ATTR_NETWORK_SECURITY_CONFIG),
        ("compileSdkVersion", ATTR_COMPILE_SDK_VERSION),
        ("compileSdkVersionCodename", ATTR_COMPILE_SDK_VERSION_CODENAME),
        ("requestLegacyExternalStorage", ATTR_REQUEST_LEGACY_EXTERNAL_STORAGE),
    ])
});

/// Resource id of an `android:` attribute, if it is one this crate knows about.
pub(crate) fn attribute_resource_id(name: &str) -> Option<u32> {
    ATTRIBUTE_IDS.get(name).copied()
}
