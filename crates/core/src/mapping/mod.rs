use std::collections::BTreeMap;
use std::f32::consts::PI;

use serde::{Deserialize, Serialize};

use crate::{MorphTarget, ReactiveError, Result, StateSnapshot};

/// Highest value a 7-bit controller can send.
pub const CONTROLLER_MAX: u8 = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn index(self) -> usize {
        match self {
            Self::X => 0,
            Self::Y => 1,
            Self::Z => 2,
        }
    }
}

/// Parameter a controller value is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "target", rename_all = "snake_case")]
pub enum ParameterPath {
    MorphWeight(MorphTarget),
    Scale,
    Rotation(Axis),
    IdleSpin,
    AmbientLight,
    DirectionalLight,
    AudioGain,
    InterpolationDuration,
    ChainDuration,
}

impl ParameterPath {
    /// Whether the parameter lives in [`StateSnapshot`] rather than in the
    /// engine settings.
    pub fn is_snapshot_field(self) -> bool {
        !matches!(
            self,
            Self::AudioGain | Self::InterpolationDuration | Self::ChainDuration
        )
    }
}

/// Concrete value routed to a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterUpdate {
    pub path: ParameterPath,
    pub value: f32,
}

impl ParameterUpdate {
    /// Writes the value into `snapshot`. Returns `false` for engine settings,
    /// which the snapshot does not carry.
    pub fn apply_to(&self, snapshot: &mut StateSnapshot) -> bool {
        let value = self.value;
        match self.path {
            ParameterPath::MorphWeight(target) => snapshot.morph_weights.set(target, value),
            ParameterPath::Scale => snapshot.scale = value,
            ParameterPath::Rotation(axis) => snapshot.rotation[axis.index()] = value,
            ParameterPath::IdleSpin => snapshot.idle_spin = value,
            ParameterPath::AmbientLight => snapshot.lighting.ambient = value,
            ParameterPath::DirectionalLight => snapshot.lighting.directional = value,
            ParameterPath::AudioGain
            | ParameterPath::InterpolationDuration
            | ParameterPath::ChainDuration => return false,
        }
        true
    }
}

/// Routes one controller to a parameter, scaling `0..=127` onto `min..=max`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ControllerBinding {
    pub controller: u8,
    pub path: ParameterPath,
    pub min: f32,
    pub max: f32,
}

impl ControllerBinding {
    pub fn new(controller: u8, path: ParameterPath, min: f32, max: f32) -> Self {
        Self {
            controller,
            path,
            min,
            max,
        }
    }

    pub fn scale(&self, value: u8) -> f32 {
        let normalized = f32::from(value.min(CONTROLLER_MAX)) / f32::from(CONTROLLER_MAX);
        self.min + (self.max - self.min) * normalized
    }
}

/// Binding of `controller` in the factory table.
pub fn default_binding(controller: u8) -> Option<ControllerBinding> {
    use ParameterPath::*;

    let (path, min, max) = match controller {
        1 => (MorphWeight(MorphTarget::Sphere), 0.0, 1.0),
        2 => (MorphWeight(MorphTarget::Cube), 0.0, 1.0),
        3 => (MorphWeight(MorphTarget::Pyramid), 0.0, 1.0),
        4 => (MorphWeight(MorphTarget::Torus), 0.0, 1.0),
        5 => (Scale, 0.25, 3.0),
        6 => (Rotation(Axis::X), -PI, PI),
        7 => (Rotation(Axis::Y), -PI, PI),
        8 => (Rotation(Axis::Z), -PI, PI),
        9 => (IdleSpin, 0.0, 2.0),
        10 => (AmbientLight, 0.0, 1.0),
        11 => (DirectionalLight, 0.0, 2.0),
        12 => (AudioGain, 0.0, 1.0),
        13 => (InterpolationDuration, 100.0, 10_000.0),
        14 => (ChainDuration, 500.0, 30_000.0),
        _ => return None,
    };
    Some(ControllerBinding::new(controller, path, min, max))
}

/// Maps a decoded control-change event through the factory table.
/// Unbound controllers yield `None`.
pub fn map_controller_to_parameter(controller_id: u8, value: u8) -> Option<ParameterUpdate> {
    default_binding(controller_id).map(|binding| ParameterUpdate {
        path: binding.path,
        value: binding.scale(value),
    })
}

/// User-editable controller table, initialised with the factory bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerMap {
    bindings: BTreeMap<u8, ControllerBinding>,
}

impl Default for ControllerMap {
    fn default() -> Self {
        Self {
            bindings: (0..=CONTROLLER_MAX)
                .filter_map(default_binding)
                .map(|binding| (binding.controller, binding))
                .collect(),
        }
    }
}

impl ControllerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn empty() -> Self {
        Self {
            bindings: BTreeMap::new(),
        }
    }

    /// Adds or replaces the binding of `binding.controller`.
    pub fn assign(&mut self, binding: ControllerBinding) -> Result<()> {
        if binding.controller > CONTROLLER_MAX {
            return Err(ReactiveError::invalid(format!(
                "controller {} is outside 0..=127",
                binding.controller
            )));
        }
        if !(binding.min.is_finite() && binding.max.is_finite()) {
            return Err(ReactiveError::invalid("binding range must be finite"));
        }
        tracing::debug!(controller = binding.controller, path = ?binding.path, "controller bound");
        self.bindings.insert(binding.controller, binding);
        Ok(())
    }

    pub fn remove(&mut self, controller: u8) -> bool {
        self.bindings.remove(&controller).is_some()
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    pub fn binding(&self, controller: u8) -> Option<&ControllerBinding> {
        self.bindings.get(&controller)
    }

    pub fn bindings(&self) -> impl Iterator<Item = &ControllerBinding> {
        self.bindings.values()
    }

    pub fn resolve(&self, controller: u8, value: u8) -> Option<ParameterUpdate> {
        self.bindings.get(&controller).map(|binding| ParameterUpdate {
            path: binding.path,
            value: binding.scale(value),
        })
    }

    pub fn export_json(&self) -> Result<String> {
        let bindings: Vec<&ControllerBinding> = self.bindings.values().collect();
        Ok(serde_json::to_string_pretty(&bindings)?)
    }

    /// Replaces the table with the bindings of a JSON export.
    pub fn import_json(&mut self, text: &str) -> Result<usize> {
        let bindings: Vec<ControllerBinding> = serde_json::from_str(text)?;
        let mut imported = Self::empty();
        for binding in bindings {
            imported.assign(binding)?;
        }
        let count = imported.bindings.len();
        *self = imported;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scales_controller_range() {
        let update = map_controller_to_parameter(2, 127).unwrap();
        assert_eq!(update.path, ParameterPath::MorphWeight(MorphTarget::Cube));
        assert_eq!(update.value, 1.0);

        let update = map_controller_to_parameter(13, 0).unwrap();
        assert_eq!(update.path, ParameterPath::InterpolationDuration);
        assert_eq!(update.value, 100.0);

        let update = map_controller_to_parameter(6, 255).unwrap();
        assert!((update.value - PI).abs() < 1e-6);
    }

    #[test]
    fn unbound_controllers_are_ignored() {
        assert!(map_controller_to_parameter(0, 64).is_none());
        assert!(map_controller_to_parameter(99, 64).is_none());
    }

    #[test]
    fn applies_snapshot_fields_only() {
        let mut snapshot = StateSnapshot::baseline();
        let scale = map_controller_to_parameter(5, 127).unwrap();
        assert!(scale.apply_to(&mut snapshot));
        assert_eq!(snapshot.scale, 3.0);

        let gain = map_controller_to_parameter(12, 64).unwrap();
        assert!(!gain.apply_to(&mut snapshot));
        assert!(!gain.path.is_snapshot_field());
    }

    #[test]
    fn custom_table_overrides_defaults() {
        let mut map = ControllerMap::new();
        assert_eq!(map.bindings().count(), 14);

        map.assign(ControllerBinding::new(1, ParameterPath::Scale, 1.0, 2.0)).unwrap();
        assert_eq!(map.resolve(1, 127).unwrap().path, ParameterPath::Scale);
        assert!(map.remove(1));
        assert!(map.resolve(1, 127).is_none());
        assert!(map.assign(ControllerBinding::new(200, ParameterPath::Scale, 0.0, 1.0)).is_err());
    }

    #[test]
    fn import_replaces_table() {
        let mut source = ControllerMap::empty();
        source
            .assign(ControllerBinding::new(
                20,
                ParameterPath::Rotation(Axis::Y),
                0.0,
                1.0,
            ))
            .unwrap();
        let text = source.export_json().unwrap();

        let mut map = ControllerMap::new();
        assert_eq!(map.import_json(&text).unwrap(), 1);
        assert!(map.resolve(1, 10).is_none());
        assert_eq!(
            map.resolve(20, 127).unwrap().path,
            ParameterPath::Rotation(Axis::Y)
        );
    }
}
