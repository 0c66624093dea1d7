//! In-process reference host.
//!
//! Keeps documents as ordered lists of labelled solids. Used by tests and by
//! the CLI to run generated code without a CAD application attached.

use super::{CadHost, Capability, CapabilityKind, HostError};
use log::{debug, info};
use parking_lot::Mutex;
use rhai::{Dynamic, EvalAltResult, FLOAT, INT, ImmutableString, Module, Shared};
use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::sync::Arc;

/// Result type for functions callable from scripts.
pub type ScriptResult<T> = Result<T, Box<EvalAltResult>>;

/// Capability names provided by [`MemoryHost`].
pub const MEMORY_HOST_CAPABILITIES: &[&str] = &["App", "Gui", "Part", "Sketch"];

/// Primitive and derived solid shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum SolidKind {
    Box {
        length: f64,
        width: f64,
        height: f64,
    },
    Cylinder {
        radius: f64,
        height: f64,
    },
    Sphere {
        radius: f64,
    },
    Cone {
        bottom_radius: f64,
        top_radius: f64,
        height: f64,
    },
    /// Extruded sketch profile.
    Prism {
        base_area: f64,
        height: f64,
    },
}

/// A solid with its placement, in millimetres.
#[derive(Debug, Clone, PartialEq)]
pub struct Solid {
    pub kind: SolidKind,
    pub placement: [f64; 3],
}

impl Solid {
    fn new(kind: SolidKind) -> Self {
        Self {
            kind,
            placement: [0.0; 3],
        }
    }

    pub fn volume(&self) -> f64 {
        match self.kind {
            SolidKind::Box {
                length,
                width,
                height,
            } => length * width * height,
            SolidKind::Cylinder { radius, height } => PI * radius * radius * height,
            SolidKind::Sphere { radius } => 4.0 / 3.0 * PI * radius.powi(3),
            SolidKind::Cone {
                bottom_radius: r1,
                top_radius: r2,
                height,
            } => PI * height * (r1 * r1 + r1 * r2 + r2 * r2) / 3.0,
            SolidKind::Prism { base_area, height } => base_area * height,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            SolidKind::Box { .. } => "box",
            SolidKind::Cylinder { .. } => "cylinder",
            SolidKind::Sphere { .. } => "sphere",
            SolidKind::Cone { .. } => "cone",
            SolidKind::Prism { .. } => "prism",
        }
    }
}

/// Closed 2D sketch profile.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Rectangle { width: f64, height: f64 },
    Circle { radius: f64 },
}

impl Profile {
    pub fn area(&self) -> f64 {
        match *self {
            Profile::Rectangle { width, height } => width * height,
            Profile::Circle { radius } => PI * radius * radius,
        }
    }
}

/// A labelled solid stored in a document.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub label: String,
    pub solid: Solid,
}

#[derive(Debug, Default)]
struct HostState {
    documents: BTreeMap<String, Vec<Feature>>,
    active: Option<String>,
    view_refreshes: u64,
    refresh_failure: Option<String>,
    close_failure: Option<String>,
}

/// Reference host keeping all documents in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<HostState>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of all open workspaces.
    pub fn workspaces(&self) -> Vec<String> {
        self.state.lock().documents.keys().cloned().collect()
    }

    /// Features of an open workspace, in insertion order.
    pub fn features(&self, workspace: &str) -> Option<Vec<Feature>> {
        self.state.lock().documents.get(workspace).cloned()
    }

    /// Number of successful view refreshes so far.
    pub fn view_refreshes(&self) -> u64 {
        self.state.lock().view_refreshes
    }

    /// Make `refresh_view` fail with the given reason (None restores it).
    pub fn fail_refresh(&self, reason: Option<&str>) {
        self.state.lock().refresh_failure = reason.map(str::to_string);
    }

    /// Make `close_workspace` fail with the given reason (None restores it).
    pub fn fail_close(&self, reason: Option<&str>) {
        self.state.lock().close_failure = reason.map(str::to_string);
    }

    fn app_capability(&self) -> Capability {
        Capability {
            name: "App".to_string(),
            description: "application root; App.active_document() returns the active document \
                          with add_object(label, solid), remove_object(label), object_count(), \
                          name(), recompute(), total_volume()"
                .to_string(),
            kind: CapabilityKind::Object {
                value: Dynamic::from(AppHandle {
                    state: self.state.clone(),
                }),
                methods: app_methods(),
            },
        }
    }

    fn gui_capability(&self) -> Capability {
        Capability {
            name: "Gui".to_string(),
            description: "view handle; Gui.fit_view() fits the active view to the model"
                .to_string(),
            kind: CapabilityKind::Object {
                value: Dynamic::from(GuiHandle {
                    state: self.state.clone(),
                }),
                methods: gui_methods(),
            },
        }
    }
}

impl CadHost for MemoryHost {
    fn create_workspace(&self, name: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if state.documents.contains_key(name) {
            return Err(HostError::WorkspaceExists(name.to_string()));
        }
        state.documents.insert(name.to_string(), Vec::new());
        state.active = Some(name.to_string());
        info!("memory host workspace created (name={})", name);
        Ok(())
    }

    fn close_workspace(&self, name: &str) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.close_failure.clone() {
            return Err(HostError::Unavailable(reason));
        }
        let Some(features) = state.documents.remove(name) else {
            return Err(HostError::UnknownWorkspace(name.to_string()));
        };
        if state.active.as_deref() == Some(name) {
            state.active = None;
        }
        info!(
            "memory host workspace closed (name={}, discarded_features={})",
            name,
            features.len()
        );
        Ok(())
    }

    fn active_workspace(&self) -> Option<String> {
        self.state.lock().active.clone()
    }

    fn has_workspace(&self, name: &str) -> bool {
        self.state.lock().documents.contains_key(name)
    }

    fn refresh_view(&self) -> Result<(), HostError> {
        let mut state = self.state.lock();
        if let Some(reason) = state.refresh_failure.clone() {
            return Err(HostError::Unavailable(reason));
        }
        if state.active.is_none() {
            return Err(HostError::NoActiveWorkspace);
        }
        state.view_refreshes += 1;
        debug!("memory host view refreshed (count={})", state.view_refreshes);
        Ok(())
    }

    fn capability(&self, name: &str) -> Option<Capability> {
        match name {
            "App" => Some(self.app_capability()),
            "Gui" => Some(self.gui_capability()),
            "Part" => Some(Capability {
                name: "Part".to_string(),
                description: "solid modeling; Part::make_box(l, w, h), Part::make_cylinder(r, h), \
                              Part::make_sphere(r), Part::make_cone(r1, r2, h); solids support \
                              translate(x, y, z), volume(), kind()"
                    .to_string(),
                kind: CapabilityKind::Namespace {
                    module: part_namespace(),
                    methods: solid_methods(),
                },
            }),
            "Sketch" => Some(Capability {
                name: "Sketch".to_string(),
                description: "2D profiles; Sketch::rectangle(w, h), Sketch::circle(r), \
                              Sketch::extrude(profile, height); profiles support area()"
                    .to_string(),
                kind: CapabilityKind::Namespace {
                    module: sketch_namespace(),
                    methods: profile_methods(),
                },
            }),
            _ => None,
        }
    }
}

#[derive(Clone)]
struct AppHandle {
    state: Arc<Mutex<HostState>>,
}

#[derive(Clone)]
struct GuiHandle {
    state: Arc<Mutex<HostState>>,
}

#[derive(Clone)]
struct DocumentHandle {
    state: Arc<Mutex<HostState>>,
    name: String,
}

impl DocumentHandle {
    fn with_features<T>(&self, f: impl FnOnce(&mut Vec<Feature>) -> T) -> ScriptResult<T> {
        let mut state = self.state.lock();
        match state.documents.get_mut(&self.name) {
            Some(features) => Ok(f(features)),
            None => Err(format!("document {} is closed", self.name).into()),
        }
    }
}

fn share(mut module: Module) -> Shared<Module> {
    module.build_index();
    Shared::new(module)
}

fn app_methods() -> Shared<Module> {
    let mut module = Module::new();
    module.set_custom_type::<AppHandle>("App");
    module.set_custom_type::<DocumentHandle>("Document");
    module.set_native_fn("active_document", active_document);
    module.set_native_fn("add_object", add_object);
    module.set_native_fn("remove_object", remove_object);
    module.set_native_fn("object_count", object_count);
    module.set_native_fn("name", document_name);
    module.set_native_fn("recompute", recompute);
    module.set_native_fn("total_volume", total_volume);
    share(module)
}

fn gui_methods() -> Shared<Module> {
    let mut module = Module::new();
    module.set_custom_type::<GuiHandle>("Gui");
    module.set_native_fn("fit_view", fit_view);
    share(module)
}

fn part_namespace() -> Shared<Module> {
    let mut module = Module::new();
    module.set_native_fn("make_box", make_box);
    module.set_native_fn("make_cylinder", make_cylinder);
    module.set_native_fn("make_sphere", make_sphere);
    module.set_native_fn("make_cone", make_cone);
    share(module)
}

fn sketch_namespace() -> Shared<Module> {
    let mut module = Module::new();
    module.set_native_fn("rectangle", rectangle);
    module.set_native_fn("circle", circle);
    module.set_native_fn("extrude", extrude);
    share(module)
}

fn register_solid_methods(module: &mut Module) {
    module.set_custom_type::<Solid>("Solid");
    module.set_native_fn("translate", translate);
    module.set_native_fn("volume", solid_volume);
    module.set_native_fn("kind", solid_kind);
}

fn solid_methods() -> Shared<Module> {
    let mut module = Module::new();
    register_solid_methods(&mut module);
    share(module)
}

/// Profile methods plus solid methods, since extrusions produce solids.
fn profile_methods() -> Shared<Module> {
    let mut module = Module::new();
    register_solid_methods(&mut module);
    module.set_custom_type::<Profile>("Profile");
    module.set_native_fn("area", profile_area);
    share(module)
}

fn active_document(app: AppHandle) -> ScriptResult<DocumentHandle> {
    let name = app
        .state
        .lock()
        .active
        .clone()
        .ok_or_else(|| Box::<EvalAltResult>::from("no active document"))?;
    Ok(DocumentHandle {
        state: app.state,
        name,
    })
}

fn add_object(doc: &mut DocumentHandle, label: ImmutableString, solid: Solid) -> ScriptResult<()> {
    if label.trim().is_empty() {
        return Err("object label must not be empty".into());
    }
    let name = doc.name.clone();
    let duplicate = doc.with_features(|features| {
        if features.iter().any(|feature| feature.label == label.as_str()) {
            return true;
        }
        features.push(Feature {
            label: label.to_string(),
            solid,
        });
        false
    })?;
    if duplicate {
        return Err(format!("object {label} already exists in {name}").into());
    }
    debug!("memory host object added (workspace={}, label={})", name, label);
    Ok(())
}

fn remove_object(doc: &mut DocumentHandle, label: ImmutableString) -> ScriptResult<bool> {
    doc.with_features(|features| {
        let before = features.len();
        features.retain(|feature| feature.label != label.as_str());
        features.len() != before
    })
}

fn object_count(doc: &mut DocumentHandle) -> ScriptResult<INT> {
    doc.with_features(|features| features.len() as INT)
}

fn document_name(doc: &mut DocumentHandle) -> ScriptResult<ImmutableString> {
    Ok(doc.name.as_str().into())
}

fn recompute(doc: &mut DocumentHandle) -> ScriptResult<()> {
    let count = doc.with_features(|features| features.len())?;
    debug!(
        "memory host document recomputed (workspace={}, features={})",
        doc.name, count
    );
    Ok(())
}

fn total_volume(doc: &mut DocumentHandle) -> ScriptResult<FLOAT> {
    doc.with_features(|features| features.iter().map(|f| f.solid.volume()).sum())
}

fn fit_view(gui: GuiHandle) -> ScriptResult<()> {
    let mut state = gui.state.lock();
    if state.active.is_none() {
        return Err("no active document to fit".into());
    }
    state.view_refreshes += 1;
    Ok(())
}

/// Read a strictly positive length from an integer or float argument.
fn dimension(name: &str, value: &Dynamic) -> ScriptResult<FLOAT> {
    let number = number(name, value)?;
    if number > 0.0 {
        Ok(number)
    } else {
        Err(format!("{name} must be positive, got {number}").into())
    }
}

fn number(name: &str, value: &Dynamic) -> ScriptResult<FLOAT> {
    let number = if let Ok(int) = value.as_int() {
        int as FLOAT
    } else if let Ok(float) = value.as_float() {
        float
    } else {
        return Err(format!("{name} must be a number, got {}", value.type_name()).into());
    };
    if number.is_finite() {
        Ok(number)
    } else {
        Err(format!("{name} must be finite").into())
    }
}

fn make_box(length: Dynamic, width: Dynamic, height: Dynamic) -> ScriptResult<Solid> {
    Ok(Solid::new(SolidKind::Box {
        length: dimension("length", &length)?,
        width: dimension("width", &width)?,
        height: dimension("height", &height)?,
    }))
}

fn make_cylinder(radius: Dynamic, height: Dynamic) -> ScriptResult<Solid> {
    Ok(Solid::new(SolidKind::Cylinder {
        radius: dimension("radius", &radius)?,
        height: dimension("height", &height)?,
    }))
}

fn make_sphere(radius: Dynamic) -> ScriptResult<Solid> {
    Ok(Solid::new(SolidKind::Sphere {
        radius: dimension("radius", &radius)?,
    }))
}

/// The top radius may be zero for a pointed cone.
fn make_cone(bottom: Dynamic, top: Dynamic, height: Dynamic) -> ScriptResult<Solid> {
    let top_radius = number("top radius", &top)?;
    if top_radius < 0.0 {
        return Err(format!("top radius must not be negative, got {top_radius}").into());
    }
    Ok(Solid::new(SolidKind::Cone {
        bottom_radius: dimension("bottom radius", &bottom)?,
        top_radius,
        height: dimension("height", &height)?,
    }))
}

fn translate(solid: &mut Solid, x: Dynamic, y: Dynamic, z: Dynamic) -> ScriptResult<Solid> {
    let offset = [number("x", &x)?, number("y", &y)?, number("z", &z)?];
    for (axis, delta) in solid.placement.iter_mut().zip(offset) {
        *axis += delta;
    }
    Ok(solid.clone())
}

fn solid_volume(solid: &mut Solid) -> ScriptResult<FLOAT> {
    Ok(solid.volume())
}

fn solid_kind(solid: &mut Solid) -> ScriptResult<ImmutableString> {
    Ok(solid.kind_name().into())
}

fn rectangle(width: Dynamic, height: Dynamic) -> ScriptResult<Profile> {
    Ok(Profile::Rectangle {
        width: dimension("width", &width)?,
        height: dimension("height", &height)?,
    })
}

fn circle(radius: Dynamic) -> ScriptResult<Profile> {
    Ok(Profile::Circle {
        radius: dimension("radius", &radius)?,
    })
}

fn extrude(profile: Profile, height: Dynamic) -> ScriptResult<Solid> {
    Ok(Solid::new(SolidKind::Prism {
        base_area: profile.area(),
        height: dimension("height", &height)?,
    }))
}

fn profile_area(profile: &mut Profile) -> ScriptResult<FLOAT> {
    Ok(profile.area())
}
