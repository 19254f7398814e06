use super::fixtures::{
    aapt_manifest, decode_log, discord_manifest, ManifestBuilder, Node, INTERNET, MANAGE, READ,
    WRITE,
};
use crate::android::res_ids::{
    ANDROID_NAMESPACE_URI, ATTR_DEBUGGABLE, ATTR_LABEL, ATTR_NAME,
    ATTR_REQUEST_LEGACY_EXTERNAL_STORAGE, ATTR_USES_CLEARTEXT_TRAFFIC, ATTR_VERSION_CODE,
    ATTR_VM_SAFE_MODE,
};
use crate::android::{AttributeValue, Event, Namespace};
use crate::patcher::{patch_manifest, ManifestPatcher, PlatformConfig};

const PACKAGE: &str = "com.aliucord";
const APP: &str = "Aliucord";

fn patched(debuggable: bool) -> Node {
    let bytes = patch_manifest(&discord_manifest(), PACKAGE, APP, debuggable).expect("patch manifest");
    Node::parse(&bytes)
}

fn patched_with(config: PlatformConfig, manifest: &[u8]) -> Node {
    let bytes = ManifestPatcher::new(config)
        .patch_manifest(manifest, PACKAGE, APP, true)
        .expect("patch manifest");
    Node::parse(&bytes)
}

#[test]
fn root_attributes_are_replaced() {
    let root = patched(false);
    assert_eq!(root.name, "manifest");
    assert_eq!(root.attr("package"), Some(&AttributeValue::from(PACKAGE)));
    assert_eq!(root.attr("compileSdkVersion"), Some(&AttributeValue::Integer(23)));
    assert_eq!(
        root.attr("compileSdkVersionCodename"),
        Some(&AttributeValue::from("6.0-2438415"))
    );
    assert_eq!(root.attr("versionCode"), Some(&AttributeValue::Integer(126021)));
    assert_eq!(root.attribute("versionCode").unwrap().resource_id, Some(ATTR_VERSION_CODE));
    assert_eq!(root.attr("platformBuildVersionCode"), Some(&AttributeValue::Integer(33)));
}

#[test]
fn absent_root_attributes_are_not_injected() {
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .plain("package", "com.discord")
        .start("application")
        .end()
        .build();
    let root = Node::parse(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    assert_eq!(root.attr("package"), Some(&AttributeValue::from(PACKAGE)));
    assert_eq!(root.attr("compileSdkVersion"), None);
    assert_eq!(root.attr("compileSdkVersionCodename"), None);
    assert_eq!(root.attributes.len(), 1);
}

#[test]
fn manage_storage_is_inserted_before_next_permission() {
    let root = patched(false);
    assert_eq!(root.permissions(), vec![INTERNET, READ, MANAGE, WRITE]);

    let manage = root.children_named("uses-permission")[2];
    let name = manage.attribute("name").unwrap();
    assert_eq!(name.namespace.as_deref(), Some(ANDROID_NAMESPACE_URI));
    assert_eq!(name.resource_id, Some(ATTR_NAME));
    assert_eq!(manage.attributes.len(), 1);
}

#[test]
fn read_permission_last_gets_no_manage_permission() {
    // Injection is keyed to a following uses-permission sibling; with none
    // left the permission is not added.
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .plain("package", "com.discord")
        .permission(INTERNET)
        .permission(READ)
        .start("application")
        .end()
        .build();
    let root = Node::parse(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    assert_eq!(root.permissions(), vec![INTERNET, READ]);
    assert!(root.descendants().iter().all(|node| node.attr("name") != Some(&AttributeValue::from(MANAGE))));
}

#[test]
fn non_permission_sibling_does_not_trigger_injection() {
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .permission(READ)
        .leaf("uses-feature", vec![("name", AttributeValue::from("android.hardware.camera"))])
        .permission(INTERNET)
        .build();
    let root = Node::parse(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    let names: Vec<_> = root.children.iter().map(|child| child.name.as_str()).collect();
    assert_eq!(names, vec!["uses-permission", "uses-feature", "uses-permission", "uses-permission"]);
    assert_eq!(root.permissions(), vec![READ, MANAGE, INTERNET]);
}

#[test]
fn dropped_attributes_never_appear() {
    let root = patched(true);
    for node in root.descendants() {
        if node.name == "uses-permission" {
            assert_eq!(node.count("maxSdkVersion"), 0);
        }
        assert_eq!(node.count("networkSecurityConfig"), 0, "in <{}>", node.name);
    }
}

#[test]
fn target_sdk_follows_platform_version() {
    let modern = patched_with(PlatformConfig::with_sdk_int(33), &discord_manifest());
    let sdk = modern.child("uses-sdk");
    assert_eq!(sdk.attr("targetSdkVersion"), Some(&AttributeValue::Integer(30)));
    assert_eq!(sdk.attr("minSdkVersion"), Some(&AttributeValue::Integer(21)));

    let older = patched_with(PlatformConfig::with_sdk_int(30), &discord_manifest());
    assert_eq!(
        older.child("uses-sdk").attr("targetSdkVersion"),
        Some(&AttributeValue::Integer(28))
    );
}

#[test]
fn application_attributes_are_rewritten_and_completed() {
    for debuggable in [true, false] {
        let root = patched(debuggable);
        let app = root.child("application");
        assert_eq!(app.attr("label"), Some(&AttributeValue::from(APP)));
        assert_eq!(app.attr("name"), Some(&AttributeValue::from("com.discord.app.App")));
        assert_eq!(app.attr("allowBackup"), Some(&AttributeValue::Boolean(false)));

        for name in ["debuggable", "vmSafeMode", "usesCleartextTraffic", "requestLegacyExternalStorage"] {
            assert_eq!(app.count(name), 1, "{name} with debuggable={debuggable}");
        }
        assert_eq!(app.attr("debuggable"), Some(&AttributeValue::Boolean(debuggable)));
        assert_eq!(app.attr("vmSafeMode"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(app.attr("usesCleartextTraffic"), Some(&AttributeValue::Boolean(true)));
        assert_eq!(app.attr("requestLegacyExternalStorage"), Some(&AttributeValue::Boolean(true)));

        assert_eq!(app.attribute("debuggable").unwrap().resource_id, Some(ATTR_DEBUGGABLE));
        assert_eq!(app.attribute("vmSafeMode").unwrap().resource_id, Some(ATTR_VM_SAFE_MODE));
        assert_eq!(
            app.attribute("usesCleartextTraffic").unwrap().resource_id,
            Some(ATTR_USES_CLEARTEXT_TRAFFIC)
        );
    }
}

#[test]
fn existing_application_flags_are_replaced_not_duplicated() {
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .start("application")
        .android("debuggable", true)
        .android("usesCleartextTraffic", false)
        .android("vmSafeMode", false)
        .android("requestLegacyExternalStorage", false)
        .build();
    let bytes = patch_manifest(&manifest, PACKAGE, APP, false).unwrap();
    let app = Node::parse(&bytes).child("application").clone();
    assert_eq!(app.attributes.len(), 4);
    assert_eq!(app.attr("debuggable"), Some(&AttributeValue::Boolean(false)));
    assert_eq!(app.attr("usesCleartextTraffic"), Some(&AttributeValue::Boolean(true)));
    assert_eq!(app.attr("requestLegacyExternalStorage"), Some(&AttributeValue::Boolean(true)));
    // vmSafeMode is not in the replacement set, so the original value stays.
    assert_eq!(app.attr("vmSafeMode"), Some(&AttributeValue::Boolean(false)));
}

#[test]
fn legacy_storage_needs_api_29() {
    let old = patched_with(PlatformConfig::with_sdk_int(28), &discord_manifest());
    let app = old.child("application");
    assert_eq!(app.count("requestLegacyExternalStorage"), 0);
    assert_eq!(app.count("vmSafeMode"), 1);
}

#[test]
fn application_attributes_are_sorted_by_resource_id() {
    let log = decode_log(&patch_manifest(&discord_manifest(), PACKAGE, APP, true).unwrap());
    // Injected attributes arrive after the children, but the platform only
    // finds attributes laid out by ascending resource id.
    let app_start = log
        .events
        .iter()
        .position(|event| matches!(event, Event::StartElement(start) if start.name == "application"))
        .unwrap();
    let attrs: Vec<_> = log.events[app_start + 1..]
        .iter()
        .take_while(|event| matches!(event, Event::Attribute(_)))
        .filter_map(|event| match event {
            Event::Attribute(attr) => Some(attr),
            _ => None,
        })
        .collect();
    let names: Vec<_> = attrs.iter().map(|attr| attr.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "label",
            "icon",
            "name",
            "debuggable",
            "allowBackup",
            "vmSafeMode",
            "usesCleartextTraffic",
            "requestLegacyExternalStorage",
        ]
    );
    let ids: Vec<u32> = attrs.iter().map(|attr| attr.resource_id.expect("resource id")).collect();
    let mut sorted = ids.clone();
    sorted.sort_unstable();
    assert_eq!(ids, sorted);
}

#[test]
fn aapt_manifest_is_patched() {
    let bytes = patch_manifest(&aapt_manifest(), PACKAGE, APP, false).expect("patch aapt manifest");
    let root = Node::parse(&bytes);
    assert_eq!(root.attr("package"), Some(&AttributeValue::from(PACKAGE)));
    assert_eq!(root.attr("versionCode"), Some(&AttributeValue::Integer(7)));
    assert_eq!(root.attr("platformBuildVersionCode"), Some(&AttributeValue::Integer(33)));
    assert_eq!(root.permissions(), vec![READ, MANAGE, INTERNET]);
    assert_eq!(root.children_named("uses-permission")[0].count("maxSdkVersion"), 0);
    assert_eq!(
        root.child("uses-sdk").attr("targetSdkVersion"),
        Some(&AttributeValue::Integer(30))
    );

    let app = root.child("application");
    let ids: Vec<_> = app.attributes.iter().map(|attr| attr.resource_id).collect();
    assert_eq!(
        ids,
        vec![
            Some(ATTR_LABEL),
            Some(ATTR_DEBUGGABLE),
            Some(ATTR_VM_SAFE_MODE),
            Some(ATTR_USES_CLEARTEXT_TRAFFIC),
            Some(ATTR_REQUEST_LEGACY_EXTERNAL_STORAGE),
        ]
    );
    assert_eq!(app.attr("label"), Some(&AttributeValue::from(APP)));
    assert_eq!(app.attr("debuggable"), Some(&AttributeValue::Boolean(false)));
    assert_eq!(
        app.child("provider").attr("authorities"),
        Some(&AttributeValue::from("com.aliucord.files"))
    );
}

#[test]
fn uses_sdk_keeps_max_sdk_version() {
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .leaf(
            "uses-sdk",
            vec![
                ("minSdkVersion", AttributeValue::Integer(21)),
                ("targetSdkVersion", AttributeValue::Integer(33)),
                ("maxSdkVersion", AttributeValue::Integer(34)),
            ],
        )
        .build();
    let root = Node::parse(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    let sdk = root.child("uses-sdk");
    assert_eq!(sdk.attr("maxSdkVersion"), Some(&AttributeValue::Integer(34)));
    assert_eq!(sdk.attr("targetSdkVersion"), Some(&AttributeValue::Integer(30)));

    let aapt = Node::parse(&patch_manifest(&aapt_manifest(), PACKAGE, APP, false).unwrap());
    assert_eq!(aapt.child("uses-sdk").attr("maxSdkVersion"), Some(&AttributeValue::Integer(34)));
}

#[test]
fn activity_labels_and_provider_authorities() {
    let root = patched(false);
    let app = root.child("application");

    let activities = app.children_named("activity");
    assert_eq!(activities[0].attr("label"), Some(&AttributeValue::from(APP)));
    assert_eq!(activities[1].attr("label"), None);

    let providers = app.children_named("provider");
    assert_eq!(
        providers[0].attr("authorities"),
        Some(&AttributeValue::from("com.aliucord.file-provider"))
    );
    assert_eq!(
        providers[1].attr("authorities"),
        Some(&AttributeValue::from("com.aliucord.androidx-startup;com.aliucord.extra"))
    );
    assert_eq!(
        providers[0].attr("name"),
        Some(&AttributeValue::from("androidx.core.content.FileProvider"))
    );

    let meta = app.child("meta-data");
    assert_eq!(meta.attr("value"), Some(&AttributeValue::from("com.discord")));
}

#[test]
fn nested_activity_outside_application_is_untouched() {
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .start("application")
        .start("activity-alias")
        .start("activity")
        .android("label", "Inner")
        .build();
    let root = Node::parse(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    let inner = root.child("application").child("activity-alias").child("activity");
    assert_eq!(inner.attr("label"), Some(&AttributeValue::from("Inner")));
}

#[test]
fn missing_namespace_uri_becomes_android() {
    let manifest = ManifestBuilder::with_namespace(Namespace::new(Some("android"), None))
        .start("manifest")
        .plain("package", "com.discord")
        .build();
    let log = decode_log(&patch_manifest(&manifest, PACKAGE, APP, false).unwrap());
    let uris: Vec<_> = log
        .events
        .iter()
        .filter_map(|event| match event {
            Event::StartNamespace(ns) | Event::EndNamespace(ns) => Some(ns.uri.as_deref()),
            _ => None,
        })
        .collect();
    assert_eq!(uris, vec![Some(ANDROID_NAMESPACE_URI), Some(ANDROID_NAMESPACE_URI)]);
}

#[test]
fn custom_permission_names() {
    let config = PlatformConfig {
        sdk_int: 33,
        read_external_storage: "custom.READ".to_string(),
        manage_external_storage: "custom.MANAGE".to_string(),
    };
    let manifest = ManifestBuilder::new()
        .start("manifest")
        .permission(READ)
        .permission("custom.READ")
        .permission(INTERNET)
        .build();
    let root = patched_with(config, &manifest);
    assert_eq!(root.permissions(), vec![READ, "custom.READ", "custom.MANAGE", INTERNET]);
}
