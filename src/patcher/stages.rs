//! Rewrite stages of the manifest visitor chain.
//!
//! Every stage is an [`EventSink`] wrapping the next sink of the chain. Events
//! are forwarded unchanged unless the stage's rule matches, and each stage
//! keeps its own view of the open elements so that state scoped to one
//! element is dropped when that element ends.

use crate::android::event::{
    Attribute, AttributeValue, ElementScopes, ElementStart, Event, EventSink, Namespace,
};
use crate::android::res_ids::{attribute_resource_id, ANDROID_NAMESPACE_URI};
use crate::android::AxmlResult;
use log::{debug, trace};
use std::collections::BTreeMap;

pub const USES_PERMISSION: &str = "uses-permission";
pub const USES_SDK: &str = "uses-sdk";
pub const APPLICATION: &str = "application";
pub const ACTIVITY: &str = "activity";
pub const PROVIDER: &str = "provider";

pub const NAME: &str = "name";
pub const LABEL: &str = "label";
pub const AUTHORITIES: &str = "authorities";
pub const MAX_SDK_VERSION: &str = "maxSdkVersion";
pub const TARGET_SDK_VERSION: &str = "targetSdkVersion";
pub const DEBUGGABLE: &str = "debuggable";
pub const VM_SAFE_MODE: &str = "vmSafeMode";
pub const USES_CLEARTEXT_TRAFFIC: &str = "usesCleartextTraffic";
pub const REQUEST_LEGACY_EXTERNAL_STORAGE: &str = "requestLegacyExternalStorage";
pub const NETWORK_SECURITY_CONFIG: &str = "networkSecurityConfig";

/// Attribute name to replacement value. Only attributes already present are
/// rewritten; their namespace and resource id are kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AttributeRules {
    replacements: BTreeMap<String, AttributeValue>,
}

impl AttributeRules {
    pub fn new() -> Self {
        AttributeRules::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.replacements.insert(name.into(), value.into());
        self
    }

    pub fn apply(&self, attr: Attribute) -> Attribute {
        match self.replacements.get(&attr.name) {
            Some(value) => {
                trace!("Replacing {} with {:?}", attr.name, value);
                attr.replace_value(value.clone())
            }
            None => attr,
        }
    }
}

/// A synthesized `android:` attribute carrying its platform resource id.
fn android_attribute(name: &str, value: AttributeValue) -> Attribute {
    Attribute {
        namespace: Some(ANDROID_NAMESPACE_URI.to_string()),
        name: name.to_string(),
        resource_id: attribute_resource_id(name),
        value,
    }
}

/// Gives namespace bindings without a uri the Android namespace, so the
/// output never needs an autogenerated alias.
pub struct NamespaceStage<S> {
    next: S,
}

impl<S: EventSink> NamespaceStage<S> {
    pub fn new(next: S) -> Self {
        NamespaceStage { next }
    }
}

fn normalize_namespace(mut ns: Namespace) -> Namespace {
    if ns.uri.as_deref().map_or(true, str::is_empty) {
        debug!("Namespace {:?} has no uri, using the android namespace", ns.prefix);
        ns.uri = Some(ANDROID_NAMESPACE_URI.to_string());
    }
    ns
}

impl<S: EventSink> EventSink for NamespaceStage<S> {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartNamespace(ns) => self.next.emit(Event::StartNamespace(normalize_namespace(ns))),
            Event::EndNamespace(ns) => self.next.emit(Event::EndNamespace(normalize_namespace(ns))),
            other => self.next.emit(other),
        }
    }
}

/// Replaces existing attributes of the document root element.
pub struct RootAttributeStage<S> {
    next: S,
    rules: AttributeRules,
    depth: usize,
}

impl<S: EventSink> RootAttributeStage<S> {
    pub fn new(next: S, rules: AttributeRules) -> Self {
        RootAttributeStage {
            next,
            rules,
            depth: 0,
        }
    }
}

impl<S: EventSink> EventSink for RootAttributeStage<S> {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartElement(_) => self.depth += 1,
            Event::EndElement(_) => self.depth = self.depth.saturating_sub(1),
            Event::Attribute(attr) if self.depth == 1 => {
                return self.next.emit(Event::Attribute(self.rules.apply(attr)));
            }
            _ => {}
        }
        self.next.emit(event)
    }
}

enum PermissionScope {
    /// The document root; remembers a manage-storage permission still owed
    /// to the next `uses-permission` sibling.
    Root { manage_storage_pending: bool },
    UsesPermission,
}

/// Rewrites the root-level `uses-permission` elements.
///
/// `maxSdkVersion` is dropped here only; the one on `uses-sdk` is kept. Once
/// the read-external-storage permission has been seen, a `uses-permission`
/// for manage-external-storage is emitted right before the next
/// `uses-permission` sibling. When the read permission is the last one,
/// nothing is added.
pub struct PermissionStage<S> {
    next: S,
    read_permission: String,
    manage_permission: String,
    scopes: ElementScopes<PermissionScope>,
}

impl<S: EventSink> PermissionStage<S> {
    pub fn new(next: S, read_permission: impl Into<String>, manage_permission: impl Into<String>) -> Self {
        PermissionStage {
            next,
            read_permission: read_permission.into(),
            manage_permission: manage_permission.into(),
            scopes: ElementScopes::new(),
        }
    }

    fn emit_manage_permission(&mut self, line: u32) -> AxmlResult<()> {
        debug!("Adding {} permission", self.manage_permission);
        let start = ElementStart::new(USES_PERMISSION).at_line(line);
        self.next.emit(Event::StartElement(start.clone()))?;
        self.next.emit(Event::Attribute(android_attribute(
            NAME,
            AttributeValue::String(self.manage_permission.clone()),
        )))?;
        self.next.emit(Event::EndElement(start.end()))
    }
}

impl<S: EventSink> EventSink for PermissionStage<S> {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match &event {
            Event::StartElement(start) => match self.scopes.depth() {
                0 => self.scopes.enter(&start.name, Some(PermissionScope::Root {
                    manage_storage_pending: false,
                })),
                1 if start.name == USES_PERMISSION => {
                    let pending = match self.scopes.current_mut() {
                        Some(PermissionScope::Root { manage_storage_pending }) => {
                            std::mem::take(manage_storage_pending)
                        }
                        _ => false,
                    };
                    if pending {
                        self.emit_manage_permission(start.line)?;
                    }
                    self.scopes.enter(&start.name, Some(PermissionScope::UsesPermission));
                }
                _ => self.scopes.enter(&start.name, None),
            },
            Event::EndElement(_) => {
                self.scopes.leave();
            }
            Event::Attribute(attr) if matches!(self.scopes.current(), Some(PermissionScope::UsesPermission)) => {
                if attr.name == MAX_SDK_VERSION {
                    trace!("Dropping {} from uses-permission", MAX_SDK_VERSION);
                    return Ok(());
                }
                if attr.name == NAME && attr.value.as_str() == Some(self.read_permission.as_str()) {
                    if let Some(PermissionScope::Root { manage_storage_pending }) = self.scopes.parent_mut() {
                        *manage_storage_pending = true;
                    }
                }
            }
            _ => {}
        }
        self.next.emit(event)
    }
}

/// Pins `targetSdkVersion` of the root-level `uses-sdk` element.
pub struct UsesSdkStage<S> {
    next: S,
    target_sdk_version: i32,
    scopes: ElementScopes<()>,
}

impl<S: EventSink> UsesSdkStage<S> {
    pub fn new(next: S, target_sdk_version: i32) -> Self {
        UsesSdkStage {
            next,
            target_sdk_version,
            scopes: ElementScopes::new(),
        }
    }

    fn in_uses_sdk(&self) -> bool {
        self.scopes.depth() == 2 && self.scopes.current_name() == Some(USES_SDK)
    }
}

impl<S: EventSink> EventSink for UsesSdkStage<S> {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartElement(ref start) => self.scopes.enter(&start.name, None),
            Event::EndElement(_) => {
                self.scopes.leave();
            }
            Event::Attribute(attr) if attr.name == TARGET_SDK_VERSION && self.in_uses_sdk() => {
                let value = AttributeValue::Integer(self.target_sdk_version);
                return self.next.emit(Event::Attribute(attr.replace_value(value)));
            }
            _ => {}
        }
        self.next.emit(event)
    }
}

/// Application attributes that have not been seen in the input yet.
struct MissingAttributes {
    legacy_storage: bool,
    vm_safe_mode: bool,
    debuggable: bool,
    cleartext_traffic: bool,
}

impl MissingAttributes {
    fn all() -> Self {
        MissingAttributes {
            legacy_storage: true,
            vm_safe_mode: true,
            debuggable: true,
            cleartext_traffic: true,
        }
    }

    fn observe(&mut self, name: &str) {
        match name {
            REQUEST_LEGACY_EXTERNAL_STORAGE => self.legacy_storage = false,
            VM_SAFE_MODE => self.vm_safe_mode = false,
            DEBUGGABLE => self.debuggable = false,
            USES_CLEARTEXT_TRAFFIC => self.cleartext_traffic = false,
            _ => {}
        }
    }
}

enum ApplicationScope {
    Application(MissingAttributes),
    Activity,
    Provider,
}

/// Rewrites the root-level `application` element and its direct `activity`
/// and `provider` children.
///
/// `label`, `debuggable`, `usesCleartextTraffic` and
/// `requestLegacyExternalStorage` are replaced, `networkSecurityConfig` is
/// dropped, and whichever of `requestLegacyExternalStorage`, `vmSafeMode`,
/// `debuggable` and `usesCleartextTraffic` never appeared is added when the
/// element ends. The legacy storage flag is only added when the platform
/// supports it.
pub struct ApplicationStage<S> {
    next: S,
    package_name: String,
    debuggable: bool,
    legacy_storage_supported: bool,
    application_rules: AttributeRules,
    activity_rules: AttributeRules,
    scopes: ElementScopes<ApplicationScope>,
}

/// Package prefix of the application being repackaged, replaced in provider authorities.
pub const AUTHORITY_PACKAGE_PREFIX: &str = "com.discord";

impl<S: EventSink> ApplicationStage<S> {
    pub fn new(
        next: S,
        app_name: &str,
        package_name: &str,
        debuggable: bool,
        legacy_storage_supported: bool,
    ) -> Self {
        ApplicationStage {
            next,
            package_name: package_name.to_string(),
            debuggable,
            legacy_storage_supported,
            application_rules: AttributeRules::new()
                .with(LABEL, app_name)
                .with(DEBUGGABLE, debuggable)
                .with(USES_CLEARTEXT_TRAFFIC, true)
                .with(REQUEST_LEGACY_EXTERNAL_STORAGE, true),
            activity_rules: AttributeRules::new().with(LABEL, app_name),
            scopes: ElementScopes::new(),
        }
    }

    fn enter(&mut self, start: &ElementStart) {
        let scope = match (self.scopes.depth(), start.name.as_str()) {
            (1, APPLICATION) => Some(ApplicationScope::Application(MissingAttributes::all())),
            (2, ACTIVITY) if self.scopes.current_name() == Some(APPLICATION) => {
                Some(ApplicationScope::Activity)
            }
            (2, PROVIDER) if self.scopes.current_name() == Some(APPLICATION) => {
                Some(ApplicationScope::Provider)
            }
            _ => None,
        };
        self.scopes.enter(&start.name, scope);
    }

    /// Returns the attribute to forward, if any.
    fn rewrite(&mut self, attr: Attribute) -> Option<Attribute> {
        match self.scopes.current_mut() {
            Some(ApplicationScope::Application(missing)) => {
                if attr.name == NETWORK_SECURITY_CONFIG {
                    debug!("Dropping {}", NETWORK_SECURITY_CONFIG);
                    return None;
                }
                missing.observe(&attr.name);
                Some(self.application_rules.apply(attr))
            }
            Some(ApplicationScope::Activity) => Some(self.activity_rules.apply(attr)),
            Some(ApplicationScope::Provider) if attr.name == AUTHORITIES => {
                let value = match &attr.value {
                    AttributeValue::String(text) => Some(AttributeValue::String(
                        text.replace(AUTHORITY_PACKAGE_PREFIX, &self.package_name),
                    )),
                    _ => None,
                };
                Some(match value {
                    Some(value) => attr.replace_value(value),
                    None => attr,
                })
            }
            _ => Some(attr),
        }
    }

    fn inject_missing(&mut self, missing: MissingAttributes) -> AxmlResult<()> {
        let mut added = Vec::new();
        if missing.legacy_storage && self.legacy_storage_supported {
            added.push(android_attribute(REQUEST_LEGACY_EXTERNAL_STORAGE, AttributeValue::Boolean(true)));
        }
        if missing.vm_safe_mode {
            added.push(android_attribute(VM_SAFE_MODE, AttributeValue::Boolean(true)));
        }
        if missing.debuggable {
            added.push(android_attribute(DEBUGGABLE, AttributeValue::Boolean(self.debuggable)));
        }
        if missing.cleartext_traffic {
            added.push(android_attribute(USES_CLEARTEXT_TRAFFIC, AttributeValue::Boolean(true)));
        }
        for attr in added {
            debug!("Adding application attribute {}", attr.name);
            self.next.emit(Event::Attribute(attr))?;
        }
        Ok(())
    }
}

impl<S: EventSink> EventSink for ApplicationStage<S> {
    fn emit(&mut self, event: Event) -> AxmlResult<()> {
        match event {
            Event::StartElement(ref start) => self.enter(start),
            Event::Attribute(attr) => {
                return match self.rewrite(attr) {
                    Some(attr) => self.next.emit(Event::Attribute(attr)),
                    None => Ok(()),
                };
            }
            Event::EndElement(_) => {
                if let Some(ApplicationScope::Application(missing)) = self.scopes.leave() {
                    self.inject_missing(missing)?;
                }
            }
            _ => {}
        }
        self.next.emit(event)
    }
}
