//! In-process stand-in for a GL driver.
//!
//! `HeadlessBackend` keeps GL's object model -- numbered shader and program
//! objects, attach/detach, link status and info logs, a current program,
//! uniform locations, and an error queue in place of `glGetError` -- but
//! compiles with the front-end checks of [`crate::glsl`] instead of a real
//! GLSL compiler. It needs no window or GPU, so it backs the test suite and
//! the offline `shaderkit check` tool.
//!
//! State lives behind a `RefCell`: like a GL context, the backend is used
//! from a single thread and every call completes before returning.

use super::ShaderBackend;
use crate::glsl::{self, ArraySize, Field, StageInterface, Storage, Variable};
use crate::stage::StageKind;
use std::cell::RefCell;
use std::collections::HashMap;
use std::num::NonZeroU32;

/// Nesting limit when expanding struct uniforms into slots.
const MAX_STRUCT_DEPTH: usize = 8;

/// Per-stage limit on active uniform components, as reported by
/// `GL_MAX_*_UNIFORM_COMPONENTS` on common desktop drivers.
const MAX_STAGE_UNIFORM_COMPONENTS: usize = 4096;

/// Shader-object handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessStage(NonZeroU32);

impl HeadlessStage {
    pub fn id(self) -> u32 {
        self.0.get()
    }
}

/// Program-object handle. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeadlessProgram(NonZeroU32);

impl HeadlessProgram {
    pub fn id(self) -> u32 {
        self.0.get()
    }
}

/// A uniform location, valid only for the program it was resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadlessLocation {
    program: NonZeroU32,
    index: usize,
}

/// One active uniform slot of a linked program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    /// Fully qualified name, e.g. `pointLights[2].position`.
    pub name: String,
    /// GLSL type name.
    pub ty: String,
    pub location: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SlotKind {
    Bool,
    Int,
    UInt,
    Float,
    FloatVec(usize),
    IntVec(usize),
    BoolVec(usize),
    Mat(usize),
    Sampler,
    Other,
}

impl SlotKind {
    fn of(ty: &str) -> SlotKind {
        match ty {
            "bool" => SlotKind::Bool,
            "int" => SlotKind::Int,
            "uint" => SlotKind::UInt,
            "float" => SlotKind::Float,
            "vec2" => SlotKind::FloatVec(2),
            "vec3" => SlotKind::FloatVec(3),
            "vec4" => SlotKind::FloatVec(4),
            "ivec2" | "uvec2" => SlotKind::IntVec(2),
            "ivec3" | "uvec3" => SlotKind::IntVec(3),
            "ivec4" | "uvec4" => SlotKind::IntVec(4),
            "bvec2" => SlotKind::BoolVec(2),
            "bvec3" => SlotKind::BoolVec(3),
            "bvec4" => SlotKind::BoolVec(4),
            "mat2" | "mat2x2" => SlotKind::Mat(2),
            "mat3" | "mat3x3" => SlotKind::Mat(3),
            "mat4" | "mat4x4" => SlotKind::Mat(4),
            t if t.contains("sampler") || t.contains("image") => SlotKind::Sampler,
            _ => SlotKind::Other,
        }
    }

    fn components(self) -> usize {
        match self {
            SlotKind::FloatVec(n) | SlotKind::IntVec(n) | SlotKind::BoolVec(n) => n,
            SlotKind::Mat(n) => n * n,
            SlotKind::Other => 0,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
struct Slot {
    name: String,
    ty: String,
    kind: SlotKind,
    value: Vec<f32>,
}

impl Slot {
    fn new(name: String, ty: &str) -> Self {
        let kind = SlotKind::of(ty);
        Self {
            name,
            ty: ty.to_string(),
            kind,
            value: vec![0.0; kind.components()],
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Upload<'a> {
    I32(i32),
    F32(f32),
    Vector(&'a [f32]),
    Matrix(usize, &'a [f32]),
}

impl Upload<'_> {
    fn describe(&self) -> String {
        match self {
            Upload::I32(_) => "glUniform1i".into(),
            Upload::F32(_) => "glUniform1f".into(),
            Upload::Vector(v) => format!("glUniform{}fv", v.len()),
            Upload::Matrix(n, _) => format!("glUniformMatrix{n}fv"),
        }
    }

    /// Converts the upload to the slot's storage, or `None` on a
    /// type/size mismatch (GL_INVALID_OPERATION).
    fn convert(&self, kind: SlotKind) -> Option<Vec<f32>> {
        let flag = |b: bool| if b { 1.0 } else { 0.0 };
        match (*self, kind) {
            (Upload::I32(v), SlotKind::Int | SlotKind::Sampler) => Some(vec![v as f32]),
            (Upload::I32(v), SlotKind::Bool) => Some(vec![flag(v != 0)]),
            (Upload::F32(v), SlotKind::Float) => Some(vec![v]),
            (Upload::F32(v), SlotKind::Bool) => Some(vec![flag(v != 0.0)]),
            (Upload::Vector(v), SlotKind::FloatVec(n)) if v.len() == n => Some(v.to_vec()),
            (Upload::Vector(v), SlotKind::BoolVec(n)) if v.len() == n => {
                Some(v.iter().map(|&c| flag(c != 0.0)).collect())
            }
            (Upload::Matrix(m, v), SlotKind::Mat(n)) if m == n => Some(v.to_vec()),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct StageRecord {
    kind: StageKind,
    compiled: bool,
    log: String,
    iface: Option<StageInterface>,
    /// Deleted while attached; freed on detach.
    delete_pending: bool,
}

#[derive(Debug, Default)]
struct ProgramRecord {
    attached: Vec<u32>,
    linked: bool,
    log: String,
    slots: Vec<Slot>,
}

#[derive(Debug, Default)]
struct State {
    next_stage: u32,
    next_program: u32,
    stages: HashMap<u32, StageRecord>,
    programs: HashMap<u32, ProgramRecord>,
    current: Option<u32>,
    errors: Vec<String>,
}

impl State {
    fn error(&mut self, message: String) {
        log::debug!("headless driver error: {message}");
        self.errors.push(message);
    }

    fn is_attached(&self, stage: u32) -> bool {
        self.programs.values().any(|p| p.attached.contains(&stage))
    }

    fn release_if_pending(&mut self, stage: u32) {
        let pending = self.stages.get(&stage).is_some_and(|s| s.delete_pending);
        if pending && !self.is_attached(stage) {
            self.stages.remove(&stage);
        }
    }
}

/// A driver-free [`ShaderBackend`].
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: RefCell<State>,
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of shader objects not yet freed.
    pub fn live_stages(&self) -> usize {
        self.state.borrow().stages.len()
    }

    /// Number of program objects not yet deleted.
    pub fn live_programs(&self) -> usize {
        self.state.borrow().programs.len()
    }

    pub fn current_program(&self) -> Option<HeadlessProgram> {
        self.state
            .borrow()
            .current
            .and_then(NonZeroU32::new)
            .map(HeadlessProgram)
    }

    /// Drains recorded driver errors (the `glGetError` queue).
    pub fn take_errors(&self) -> Vec<String> {
        std::mem::take(&mut self.state.borrow_mut().errors)
    }

    /// Lists the active uniform slots of a linked program in location order.
    pub fn active_uniforms(&self, program: HeadlessProgram) -> Vec<UniformInfo> {
        let state = self.state.borrow();
        state
            .programs
            .get(&program.id())
            .map(|p| {
                p.slots
                    .iter()
                    .enumerate()
                    .map(|(location, slot)| UniformInfo {
                        name: slot.name.clone(),
                        ty: slot.ty.clone(),
                        location,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    fn upload(&self, location: Option<&HeadlessLocation>, upload: Upload<'_>) {
        let Some(location) = location else {
            return;
        };
        let mut state = self.state.borrow_mut();
        let Some(current) = state.current else {
            state.error(format!("GL_INVALID_OPERATION: {} with no current program", upload.describe()));
            return;
        };
        if current != location.program.get() {
            state.error(format!(
                "GL_INVALID_OPERATION: {} location belongs to program {}, current is {current}",
                upload.describe(),
                location.program
            ));
            return;
        }

        let result = state
            .programs
            .get_mut(&current)
            .and_then(|p| p.slots.get_mut(location.index))
            .map(|slot| match upload.convert(slot.kind) {
                Some(value) => {
                    slot.value = value;
                    Ok(())
                }
                None => Err(format!(
                    "GL_INVALID_OPERATION: {} does not match uniform `{}' of type `{}'",
                    upload.describe(),
                    slot.name,
                    slot.ty
                )),
            });

        match result {
            Some(Ok(())) => {}
            Some(Err(message)) => state.error(message),
            None => state.error(format!("GL_INVALID_OPERATION: stale location {location:?}")),
        }
    }
}

impl ShaderBackend for HeadlessBackend {
    type Stage = HeadlessStage;
    type Program = HeadlessProgram;
    type Location = HeadlessLocation;

    fn create_stage(&self, kind: StageKind) -> Result<HeadlessStage, String> {
        let mut state = self.state.borrow_mut();
        state.next_stage += 1;
        let id = NonZeroU32::new(state.next_stage).ok_or("shader object ids exhausted")?;
        state.stages.insert(
            id.get(),
            StageRecord {
                kind,
                compiled: false,
                log: String::new(),
                iface: None,
                delete_pending: false,
            },
        );
        Ok(HeadlessStage(id))
    }

    fn compile_stage(&self, stage: HeadlessStage, source: &str) {
        let mut state = self.state.borrow_mut();
        let Some(record) = state.stages.get_mut(&stage.id()) else {
            state.error(format!("GL_INVALID_VALUE: no shader object {}", stage.id()));
            return;
        };
        match glsl::scan(source) {
            Ok(iface) => {
                record.compiled = true;
                record.log.clear();
                record.iface = Some(iface);
            }
            Err(diagnostics) => {
                record.compiled = false;
                record.iface = None;
                record.log = diagnostics
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("\n");
            }
        }
    }

    fn stage_compile_status(&self, stage: HeadlessStage) -> bool {
        self.state
            .borrow()
            .stages
            .get(&stage.id())
            .is_some_and(|s| s.compiled)
    }

    fn stage_info_log(&self, stage: HeadlessStage) -> String {
        self.state
            .borrow()
            .stages
            .get(&stage.id())
            .map(|s| s.log.clone())
            .unwrap_or_default()
    }

    fn delete_stage(&self, stage: HeadlessStage) {
        let mut state = self.state.borrow_mut();
        let id = stage.id();
        if !state.stages.contains_key(&id) {
            state.error(format!("GL_INVALID_VALUE: no shader object {id}"));
            return;
        }
        if state.is_attached(id) {
            if let Some(record) = state.stages.get_mut(&id) {
                record.delete_pending = true;
            }
        } else {
            state.stages.remove(&id);
        }
    }

    fn create_program(&self) -> Result<HeadlessProgram, String> {
        let mut state = self.state.borrow_mut();
        state.next_program += 1;
        let id = NonZeroU32::new(state.next_program).ok_or("program object ids exhausted")?;
        state.programs.insert(id.get(), ProgramRecord::default());
        Ok(HeadlessProgram(id))
    }

    fn attach_stage(&self, program: HeadlessProgram, stage: HeadlessStage) {
        let mut state = self.state.borrow_mut();
        if !state.stages.contains_key(&stage.id()) {
            state.error(format!("GL_INVALID_VALUE: no shader object {}", stage.id()));
            return;
        }
        let Some(record) = state.programs.get_mut(&program.id()) else {
            state.error(format!("GL_INVALID_VALUE: no program object {}", program.id()));
            return;
        };
        if record.attached.contains(&stage.id()) {
            state.error(format!(
                "GL_INVALID_OPERATION: shader {} already attached to program {}",
                stage.id(),
                program.id()
            ));
            return;
        }
        record.attached.push(stage.id());
    }

    fn detach_stage(&self, program: HeadlessProgram, stage: HeadlessStage) {
        let mut state = self.state.borrow_mut();
        let detached = state.programs.get_mut(&program.id()).is_some_and(|p| {
            let before = p.attached.len();
            p.attached.retain(|&s| s != stage.id());
            p.attached.len() != before
        });
        if !detached {
            state.error(format!(
                "GL_INVALID_OPERATION: shader {} is not attached to program {}",
                stage.id(),
                program.id()
            ));
            return;
        }
        state.release_if_pending(stage.id());
    }

    fn link_program(&self, program: HeadlessProgram) {
        let mut state = self.state.borrow_mut();
        let Some(attached) = state.programs.get(&program.id()).map(|p| p.attached.clone()) else {
            state.error(format!("GL_INVALID_VALUE: no program object {}", program.id()));
            return;
        };

        let outcome = {
            let stages: Vec<(StageKind, Option<&StageInterface>)> = attached
                .iter()
                .filter_map(|id| state.stages.get(id))
                .map(|s| (s.kind, s.iface.as_ref()))
                .collect();
            link(&stages)
        };

        if let Some(record) = state.programs.get_mut(&program.id()) {
            match outcome {
                Ok(slots) => {
                    record.linked = true;
                    record.log.clear();
                    record.slots = slots;
                }
                Err(log) => {
                    record.linked = false;
                    record.log = log;
                    record.slots.clear();
                }
            }
        }
    }

    fn program_link_status(&self, program: HeadlessProgram) -> bool {
        self.state
            .borrow()
            .programs
            .get(&program.id())
            .is_some_and(|p| p.linked)
    }

    fn program_info_log(&self, program: HeadlessProgram) -> String {
        self.state
            .borrow()
            .programs
            .get(&program.id())
            .map(|p| p.log.clone())
            .unwrap_or_default()
    }

    fn delete_program(&self, program: HeadlessProgram) {
        let mut state = self.state.borrow_mut();
        let Some(record) = state.programs.remove(&program.id()) else {
            state.error(format!("GL_INVALID_VALUE: no program object {}", program.id()));
            return;
        };
        if state.current == Some(program.id()) {
            state.current = None;
        }
        for stage in record.attached {
            state.release_if_pending(stage);
        }
    }

    fn use_program(&self, program: Option<HeadlessProgram>) {
        let mut state = self.state.borrow_mut();
        match program {
            None => state.current = None,
            Some(p) => match state.programs.get(&p.id()).map(|r| r.linked) {
                Some(true) => state.current = Some(p.id()),
                Some(false) => state.error(format!(
                    "GL_INVALID_OPERATION: program {} is not linked",
                    p.id()
                )),
                None => state.error(format!("GL_INVALID_VALUE: no program object {}", p.id())),
            },
        }
    }

    fn uniform_location(&self, program: HeadlessProgram, name: &str) -> Option<HeadlessLocation> {
        let state = self.state.borrow();
        let record = state.programs.get(&program.id()).filter(|p| p.linked)?;
        let array_base = format!("{name}[0]");
        let index = record
            .slots
            .iter()
            .position(|s| s.name == name)
            .or_else(|| record.slots.iter().position(|s| s.name == array_base))?;
        Some(HeadlessLocation {
            program: program.0,
            index,
        })
    }

    fn uniform_1_i32(&self, location: Option<&HeadlessLocation>, value: i32) {
        self.upload(location, Upload::I32(value));
    }

    fn uniform_1_f32(&self, location: Option<&HeadlessLocation>, value: f32) {
        self.upload(location, Upload::F32(value));
    }

    fn uniform_2_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 2]) {
        self.upload(location, Upload::Vector(&value));
    }

    fn uniform_3_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 3]) {
        self.upload(location, Upload::Vector(&value));
    }

    fn uniform_4_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 4]) {
        self.upload(location, Upload::Vector(&value));
    }

    fn uniform_matrix_2_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 4]) {
        self.upload(location, Upload::Matrix(2, &value));
    }

    fn uniform_matrix_3_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 9]) {
        self.upload(location, Upload::Matrix(3, &value));
    }

    fn uniform_matrix_4_f32(&self, location: Option<&HeadlessLocation>, value: [f32; 16]) {
        self.upload(location, Upload::Matrix(4, &value));
    }

    fn read_uniform_f32(
        &self,
        program: HeadlessProgram,
        location: &HeadlessLocation,
        out: &mut [f32],
    ) {
        let mut state = self.state.borrow_mut();
        if location.program != program.0 {
            state.error(format!(
                "GL_INVALID_OPERATION: location belongs to program {}, not {}",
                location.program,
                program.id()
            ));
            return;
        }
        let value = state
            .programs
            .get(&program.id())
            .and_then(|p| p.slots.get(location.index))
            .map(|s| s.value.clone());
        match value {
            Some(value) => {
                for (dst, src) in out.iter_mut().zip(value) {
                    *dst = src;
                }
            }
            None => state.error(format!("GL_INVALID_OPERATION: stale location {location:?}")),
        }
    }
}

/// Links the attached stages, returning the active uniform slots or the
/// info log of the failure.
fn link(stages: &[(StageKind, Option<&StageInterface>)]) -> Result<Vec<Slot>, String> {
    if stages.is_empty() {
        return Err("ERROR: no shaders attached to the program".into());
    }

    let mut compiled: Vec<(StageKind, &StageInterface)> = Vec::with_capacity(stages.len());
    for (kind, iface) in stages {
        match iface {
            Some(iface) => compiled.push((*kind, iface)),
            None => return Err(format!("ERROR: {kind} shader was not successfully compiled")),
        }
    }

    let kinds = pipeline_order(compiled.iter().map(|(k, _)| *k));

    for &kind in &kinds {
        let mains = compiled
            .iter()
            .filter(|(k, i)| *k == kind && i.defines_main())
            .count();
        match mains {
            0 => return Err(format!("ERROR: {kind} shader lacks `main'")),
            1 => {}
            _ => return Err(format!("ERROR: multiple definitions of `main' in {kind} shaders")),
        }
    }

    if kinds.contains(&StageKind::Fragment) && !kinds.contains(&StageKind::Vertex) {
        return Err("ERROR: program lacks a vertex shader".into());
    }

    let es: Vec<bool> = compiled
        .iter()
        .filter_map(|(_, i)| i.version.as_ref())
        .map(|v| v.profile.as_deref() == Some("es") || v.number == 100)
        .collect();
    if es.windows(2).any(|w| w[0] != w[1]) {
        return Err("ERROR: cannot link GLSL ES shaders with desktop GLSL shaders".into());
    }

    for pair in kinds.windows(2) {
        check_interface(&compiled, pair[0], pair[1])?;
    }

    uniform_slots(&compiled)
}

/// Distinct stage kinds, vertex first.
fn pipeline_order(kinds: impl Iterator<Item = StageKind>) -> Vec<StageKind> {
    let mut kinds: Vec<StageKind> = kinds.collect();
    kinds.sort_by_key(|k| k.pipeline_index());
    kinds.dedup();
    kinds
}

fn stage_variables<'a>(
    compiled: &'a [(StageKind, &'a StageInterface)],
    kind: StageKind,
    output: bool,
) -> Vec<&'a Variable> {
    compiled
        .iter()
        .filter(|(k, _)| *k == kind)
        .flat_map(|(_, iface)| iface.variables.iter())
        .filter(|v| match v.storage {
            Storage::Out => output,
            Storage::In => !output,
            Storage::Varying => {
                if output {
                    kind != StageKind::Fragment
                } else {
                    kind != StageKind::Vertex
                }
            }
            Storage::Uniform => false,
        })
        .filter(|v| !v.is_builtin())
        .collect()
}

fn check_interface(
    compiled: &[(StageKind, &StageInterface)],
    producer: StageKind,
    consumer: StageKind,
) -> Result<(), String> {
    let outputs = stage_variables(compiled, producer, true);

    for input in stage_variables(compiled, consumer, false) {
        let matched = outputs.iter().find(|out| match (&input.block, &out.block) {
            (Some(_), Some(_)) => out.ty == input.ty,
            (None, None) => out.name == input.name,
            _ => false,
        });

        let Some(output) = matched else {
            return Err(format!(
                "ERROR: {consumer} shader input `{}' has no matching output in the previous stage ({producer})",
                input.name
            ));
        };

        if output.ty != input.ty {
            return Err(format!(
                "ERROR: `{}' declared as type `{}' in the {producer} shader and type `{}' in the {consumer} shader",
                input.name, output.ty, input.ty
            ));
        }

        if let (Some(a), Some(b)) = (&output.block, &input.block) {
            let same = a.len() == b.len()
                && a.iter().zip(b).all(|(x, y)| x.name == y.name && x.ty == y.ty);
            if !same {
                return Err(format!(
                    "ERROR: interface block `{}' members differ between the {producer} and {consumer} shaders",
                    input.ty
                ));
            }
        }
    }

    Ok(())
}

fn uniform_slots(compiled: &[(StageKind, &StageInterface)]) -> Result<Vec<Slot>, String> {
    let ordered = pipeline_order(compiled.iter().map(|(k, _)| *k));

    // name -> (declaration, declaring stage's structs, active anywhere)
    let mut order: Vec<&str> = Vec::new();
    let mut seen: HashMap<&str, (&Variable, &HashMap<String, Vec<Field>>, bool)> = HashMap::new();

    for kind in ordered {
        let mut components = 0usize;
        for (_, iface) in compiled.iter().filter(|(k, _)| *k == kind) {
            for var in iface.with_storage(Storage::Uniform) {
                if var.block.is_some() || var.is_builtin() {
                    continue;
                }
                let active = iface.is_referenced(&var.name);
                if active {
                    let n = uniform_components(&var.ty, var.array, &iface.structs, 0)?;
                    components = components.saturating_add(n);
                }
                match seen.get_mut(var.name.as_str()) {
                    Some((first, _, was_active)) => {
                        if first.ty != var.ty || first.array != var.array {
                            return Err(format!(
                                "ERROR: uniform `{}' declared as type `{}' and type `{}'",
                                var.name, first.ty, var.ty
                            ));
                        }
                        *was_active |= active;
                    }
                    None => {
                        order.push(&var.name);
                        seen.insert(&var.name, (var, &iface.structs, active));
                    }
                }
            }
        }
        if components > MAX_STAGE_UNIFORM_COMPONENTS {
            return Err(format!(
                "ERROR: too many uniform components in the {kind} shader \
                 ({components} used, limit {MAX_STAGE_UNIFORM_COMPONENTS})"
            ));
        }
    }

    let mut slots = Vec::new();
    for name in order {
        let (var, structs, active) = seen[name];
        if active {
            expand(&var.name, &var.ty, var.array, structs, 0, &mut slots)?;
        }
    }
    Ok(slots)
}

/// Counts the float/int components a uniform occupies, saturating instead
/// of overflowing so oversized arrays are rejected before any slot exists.
fn uniform_components(
    ty: &str,
    array: Option<ArraySize>,
    structs: &HashMap<String, Vec<Field>>,
    depth: usize,
) -> Result<usize, String> {
    if depth > MAX_STRUCT_DEPTH {
        return Err(format!("ERROR: struct nesting too deep in `{ty}'"));
    }
    let element = match structs.get(ty) {
        Some(fields) => fields.iter().try_fold(0usize, |acc, field| {
            uniform_components(&field.ty, field.array, structs, depth + 1)
                .map(|n| acc.saturating_add(n))
        })?,
        None => SlotKind::of(ty).components().max(1),
    };
    let count = match array {
        Some(ArraySize::Sized(n)) => n,
        Some(ArraySize::Unsized) | None => 1,
    };
    Ok(element.saturating_mul(count))
}

fn expand(
    path: &str,
    ty: &str,
    array: Option<ArraySize>,
    structs: &HashMap<String, Vec<Field>>,
    depth: usize,
    slots: &mut Vec<Slot>,
) -> Result<(), String> {
    match array {
        Some(ArraySize::Sized(n)) => {
            for i in 0..n {
                expand_one(&format!("{path}[{i}]"), ty, structs, depth, slots)?;
            }
            Ok(())
        }
        Some(ArraySize::Unsized) => expand_one(&format!("{path}[0]"), ty, structs, depth, slots),
        None => expand_one(path, ty, structs, depth, slots),
    }
}

fn expand_one(
    path: &str,
    ty: &str,
    structs: &HashMap<String, Vec<Field>>,
    depth: usize,
    slots: &mut Vec<Slot>,
) -> Result<(), String> {
    if depth > MAX_STRUCT_DEPTH {
        return Err(format!("ERROR: struct nesting too deep at `{path}'"));
    }
    match structs.get(ty) {
        Some(fields) => {
            for field in fields {
                let child = format!("{path}.{}", field.name);
                expand(&child, &field.ty, field.array, structs, depth + 1, slots)?;
            }
            Ok(())
        }
        None => {
            slots.push(Slot::new(path.to_string(), ty));
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VS: &str = "#version 330 core\nlayout (location = 0) in vec3 aPos;\nout vec3 FragPos;\nuniform mat4 model;\nvoid main() { FragPos = aPos; gl_Position = model * vec4(aPos, 1.0); }\n";
    const FS: &str = "#version 330 core\nin vec3 FragPos;\nout vec4 color;\nuniform vec3 tint;\nuniform float unused;\nvoid main() { color = vec4(FragPos * tint, 1.0); }\n";

    fn stage(gl: &HeadlessBackend, kind: StageKind, src: &str) -> HeadlessStage {
        let s = gl.create_stage(kind).unwrap();
        gl.compile_stage(s, src);
        s
    }

    fn linked(gl: &HeadlessBackend, sources: &[(StageKind, &str)]) -> HeadlessProgram {
        let p = gl.create_program().unwrap();
        for (kind, src) in sources {
            let s = stage(gl, *kind, src);
            gl.attach_stage(p, s);
        }
        gl.link_program(p);
        p
    }

    #[test]
    fn handles_are_non_zero_and_distinct() {
        let gl = HeadlessBackend::new();
        let a = gl.create_program().unwrap();
        let b = gl.create_program().unwrap();
        assert_ne!(a.id(), 0);
        assert_ne!(a, b);
    }

    #[test]
    fn compile_failure_reports_log() {
        let gl = HeadlessBackend::new();
        let s = stage(&gl, StageKind::Vertex, "#version 330 core\nvoid main() {");
        assert!(!gl.stage_compile_status(s));
        assert!(gl.stage_info_log(s).starts_with("ERROR: 0:2:"), "{}", gl.stage_info_log(s));
    }

    #[test]
    fn links_matching_stages_and_lists_active_uniforms() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, FS)]);
        assert!(gl.program_link_status(p), "{}", gl.program_info_log(p));

        let names: Vec<_> = gl.active_uniforms(p).into_iter().map(|u| u.name).collect();
        assert_eq!(names, ["model", "tint"], "`unused` is optimised out");
    }

    #[test]
    fn missing_varying_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = "#version 330 core\nin vec3 Normal;\nout vec4 c;\nvoid main() { c = vec4(Normal, 1.0); }";
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        assert!(!gl.program_link_status(p));
        assert!(gl.program_info_log(p).contains("Normal"), "{}", gl.program_info_log(p));
    }

    #[test]
    fn varying_type_mismatch_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = "#version 330 core\nin vec4 FragPos;\nout vec4 c;\nvoid main() { c = FragPos; }";
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        let log = gl.program_info_log(p);
        assert!(log.contains("vec3") && log.contains("vec4"), "{log}");
    }

    #[test]
    fn missing_main_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = "#version 330 core\nout vec4 c;\nvoid helper() {}";
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        assert!(gl.program_info_log(p).contains("main"));
    }

    #[test]
    fn fragment_without_vertex_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = "#version 330 core\nout vec4 c;\nvoid main() { c = vec4(1.0); }";
        let p = linked(&gl, &[(StageKind::Fragment, fs)]);
        assert!(!gl.program_link_status(p));
    }

    #[test]
    fn conflicting_uniform_types_fail_link() {
        let gl = HeadlessBackend::new();
        let fs = "#version 330 core\nin vec3 FragPos;\nuniform vec4 model;\nout vec4 c;\nvoid main() { c = model; }";
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        assert!(gl.program_info_log(p).contains("model"));
    }

    #[test]
    fn geometry_stage_matches_interface_blocks() {
        let vs = "#version 330 core\nin vec3 aPos;\nout VS_OUT { vec3 normal; } vs_out;\nvoid main() { vs_out.normal = aPos; }";
        let gs = "#version 330 core\nlayout (triangles) in;\nlayout (line_strip, max_vertices = 6) out;\nin VS_OUT { vec3 normal; } gs_in[];\nvoid main() { gl_Position = vec4(gs_in[0].normal, 1.0); EmitVertex(); }";
        let fs = "#version 330 core\nout vec4 c;\nvoid main() { c = vec4(1.0); }";
        let gl = HeadlessBackend::new();
        let p = linked(
            &gl,
            &[(StageKind::Vertex, vs), (StageKind::Geometry, gs), (StageKind::Fragment, fs)],
        );
        assert!(gl.program_link_status(p), "{}", gl.program_info_log(p));
    }

    #[test]
    fn struct_arrays_expand_into_slots() {
        let fs = r#"#version 330 core
#define NR_POINT_LIGHTS 2
struct PointLight { vec3 position; float linear; };
uniform PointLight pointLights[NR_POINT_LIGHTS];
in vec3 FragPos;
out vec4 c;
void main() { c = vec4(pointLights[0].position * pointLights[1].linear, 1.0); }
"#;
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        let names: Vec<_> = gl.active_uniforms(p).into_iter().map(|u| u.name).collect();
        assert!(names.contains(&"pointLights[1].linear".to_string()), "{names:?}");
        assert!(gl.uniform_location(p, "pointLights[0].position").is_some());
        assert!(gl.uniform_location(p, "pointLights[2].position").is_none());
    }

    #[test]
    fn array_base_name_resolves_to_first_element() {
        let fs = "#version 330 core\nuniform float weights[3];\nin vec3 FragPos;\nout vec4 c;\nvoid main() { c = vec4(weights[0]); }";
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        let base = gl.uniform_location(p, "weights").unwrap();
        let first = gl.uniform_location(p, "weights[0]").unwrap();
        assert_eq!(base, first);
    }

    #[test]
    fn upload_requires_current_program() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, FS)]);
        let loc = gl.uniform_location(p, "tint");
        gl.uniform_3_f32(loc.as_ref(), [1.0, 2.0, 3.0]);
        assert_eq!(gl.take_errors().len(), 1);

        gl.use_program(Some(p));
        gl.uniform_3_f32(loc.as_ref(), [1.0, 2.0, 3.0]);
        assert!(gl.take_errors().is_empty());

        let mut out = [0.0; 3];
        gl.read_uniform_f32(p, loc.as_ref().unwrap(), &mut out);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn mismatched_upload_records_error_and_keeps_value() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, FS)]);
        gl.use_program(Some(p));
        let loc = gl.uniform_location(p, "tint");
        gl.uniform_1_f32(loc.as_ref(), 5.0);

        let errors = gl.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("tint"), "{errors:?}");

        let mut out = [9.0; 3];
        gl.read_uniform_f32(p, loc.as_ref().unwrap(), &mut out);
        assert_eq!(out, [0.0; 3]);
    }

    #[test]
    fn none_location_upload_is_silent() {
        let gl = HeadlessBackend::new();
        gl.uniform_1_f32(None, 1.0);
        assert!(gl.take_errors().is_empty());
    }

    #[test]
    fn using_unlinked_program_keeps_current() {
        let gl = HeadlessBackend::new();
        let good = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, FS)]);
        let bad = gl.create_program().unwrap();
        gl.use_program(Some(good));
        gl.use_program(Some(bad));
        assert_eq!(gl.current_program(), Some(good));
        assert_eq!(gl.take_errors().len(), 1);
    }

    #[test]
    fn deleting_attached_stage_defers_until_detach() {
        let gl = HeadlessBackend::new();
        let p = gl.create_program().unwrap();
        let s = stage(&gl, StageKind::Vertex, VS);
        gl.attach_stage(p, s);
        gl.delete_stage(s);
        assert_eq!(gl.live_stages(), 1);
        gl.detach_stage(p, s);
        assert_eq!(gl.live_stages(), 0);
    }

    #[test]
    fn deleting_current_program_unbinds_it() {
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, FS)]);
        gl.use_program(Some(p));
        gl.delete_program(p);
        assert_eq!(gl.current_program(), None);
        assert_eq!(gl.live_programs(), 0);
    }

    #[test]
    fn bool_uniform_accepts_int_and_float_uploads() {
        let fs = "#version 330 core\nuniform bool blinn;\nin vec3 FragPos;\nout vec4 c;\nvoid main() { c = blinn ? vec4(1.0) : vec4(0.0); }";
        let gl = HeadlessBackend::new();
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, fs)]);
        gl.use_program(Some(p));
        let loc = gl.uniform_location(p, "blinn").unwrap();

        let mut out = [0.0];
        gl.uniform_1_i32(Some(&loc), 7);
        gl.read_uniform_f32(p, &loc, &mut out);
        assert_eq!(out, [1.0]);

        gl.uniform_1_f32(Some(&loc), 0.0);
        gl.read_uniform_f32(p, &loc, &mut out);
        assert_eq!(out, [0.0]);
        assert!(gl.take_errors().is_empty());
    }

    fn fragment_with(uniforms: &str, expr: &str) -> String {
        format!("#version 330 core\n{uniforms}\nout vec4 c;\nvoid main() {{ c = vec4({expr}); }}\n")
    }

    #[test]
    fn oversized_uniform_array_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = fragment_with("uniform float w[20000000];", "w[0]");
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &fs)]);

        assert!(!gl.program_link_status(p));
        let log = gl.program_info_log(p);
        assert!(log.contains("too many uniform components in the fragment shader"), "got: {log}");
        assert!(gl.active_uniforms(p).is_empty());
    }

    #[test]
    fn defined_array_size_near_u32_max_fails_link() {
        let gl = HeadlessBackend::new();
        let fs = fragment_with("#define N 4000000000\nuniform float w[N];", "w[1]");
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &fs)]);
        assert!(!gl.program_link_status(p));
        assert!(gl.program_info_log(p).contains("too many uniform components"));
    }

    #[test]
    fn uniform_component_limit_is_per_stage_and_inclusive() {
        let gl = HeadlessBackend::new();
        let at_limit = fragment_with("uniform vec4 bones[1024];", "bones[0]");
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &at_limit)]);
        assert!(gl.program_link_status(p), "{}", gl.program_info_log(p));
        assert_eq!(gl.active_uniforms(p).len(), 1 + 1024, "model plus every bone");

        let over = fragment_with("uniform vec4 bones[1025];", "bones[0]");
        let q = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &over)]);
        assert!(!gl.program_link_status(q));
    }

    #[test]
    fn struct_array_components_count_every_field() {
        let gl = HeadlessBackend::new();
        let fs = fragment_with(
            "struct Light { vec3 position; vec3 color; };\nuniform Light lights[700];",
            "lights[0].color, 1.0",
        );
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &fs)]);
        let log = gl.program_info_log(p);
        assert!(log.contains("4200 used"), "got: {log}");
    }

    #[test]
    fn program_without_fragment_stage_needs_no_vertex_stage() {
        let gl = HeadlessBackend::new();
        let gs = "#version 330 core\nlayout (points) in;\nlayout (points, max_vertices = 1) out;\nvoid main() { EmitVertex(); }";
        let p = linked(&gl, &[(StageKind::Geometry, gs)]);
        assert!(gl.program_link_status(p), "{}", gl.program_info_log(p));
    }

    #[test]
    fn conditional_uniform_declarations_link() {
        let gl = HeadlessBackend::new();
        let fs = fragment_with(
            "#define USE_RGBA\n#ifdef USE_RGBA\nuniform vec4 tint;\n#else\nuniform vec3 tint;\n#endif",
            "tint",
        );
        let p = linked(&gl, &[(StageKind::Vertex, VS), (StageKind::Fragment, &fs)]);
        assert!(gl.program_link_status(p), "{}", gl.program_info_log(p));
        let tint = gl.active_uniforms(p).into_iter().find(|u| u.name == "tint");
        assert_eq!(tint.map(|u| u.ty).as_deref(), Some("vec4"));
    }
}
