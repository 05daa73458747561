//! [`ControllerRegistry`] – static table of known controllers.
//!
//! Built once from configuration at startup and read-only thereafter;
//! changing the controller set requires redeployment, not runtime calls.
//! Validation happens here so an invalid switch target is rejected at
//! selection time instead of deep inside a switching call.

use std::collections::HashMap;

use strider_types::{ControllerDescriptor, ControllerKind, SupervisorError};

/// Immutable lookup table over [`ControllerDescriptor`]s.
///
/// Exactly one descriptor has [`ControllerKind::Safe`]; construction fails
/// otherwise.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use strider_supervisor::ControllerRegistry;
/// use strider_types::{ControllerDescriptor, ControllerKind};
///
/// let registry = ControllerRegistry::from_descriptors(vec![
///     ControllerDescriptor::new("safe_hold", ControllerKind::Safe, Duration::from_millis(500)),
///     ControllerDescriptor::new("normal", ControllerKind::Commanding, Duration::from_secs(1)),
/// ])
/// .unwrap();
///
/// assert_eq!(registry.safe().name, "safe_hold");
/// assert!(registry.get("normal").is_ok());
/// assert!(registry.get("moonwalk").is_err());
/// ```
pub struct ControllerRegistry {
    controllers: HashMap<String, ControllerDescriptor>,
    safe: String,
}

impl ControllerRegistry {
    /// Build a registry from static configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::Config`] when the descriptor set is empty,
    /// contains a duplicate or empty name, or does not contain exactly one
    /// safe controller.
    pub fn from_descriptors(
        descriptors: Vec<ControllerDescriptor>,
    ) -> Result<Self, SupervisorError> {
        if descriptors.is_empty() {
            return Err(SupervisorError::Config(
                "controller registry must not be empty".into(),
            ));
        }

        let mut controllers = HashMap::with_capacity(descriptors.len());
        let mut safe: Option<String> = None;

        for desc in descriptors {
            if desc.name.is_empty() {
                return Err(SupervisorError::Config(
                    "controller name must not be empty".into(),
                ));
            }
            if desc.kind == ControllerKind::Safe {
                if let Some(existing) = &safe {
                    return Err(SupervisorError::Config(format!(
                        "multiple safe controllers: '{existing}' and '{}'",
                        desc.name
                    )));
                }
                safe = Some(desc.name.clone());
            }
            if controllers.insert(desc.name.clone(), desc).is_some() {
                return Err(SupervisorError::Config(
                    "duplicate controller name in registry".into(),
                ));
            }
        }

        let safe = safe.ok_or_else(|| {
            SupervisorError::Config("registry must contain exactly one safe controller".into())
        })?;

        Ok(Self { controllers, safe })
    }

    /// Look up a controller by name.
    ///
    /// # Errors
    ///
    /// Returns [`SupervisorError::UnknownController`] on a miss.
    pub fn get(&self, name: &str) -> Result<&ControllerDescriptor, SupervisorError> {
        self.controllers
            .get(name)
            .ok_or_else(|| SupervisorError::UnknownController(name.to_string()))
    }

    /// The safe/holding controller's descriptor.
    pub fn safe(&self) -> &ControllerDescriptor {
        // The safe name is validated at construction; the entry always exists.
        &self.controllers[&self.safe]
    }

    /// All registered descriptors, in unspecified order.
    pub fn all(&self) -> impl Iterator<Item = &ControllerDescriptor> {
        self.controllers.values()
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn desc(name: &str, kind: ControllerKind) -> ControllerDescriptor {
        ControllerDescriptor::new(name, kind, Duration::from_millis(500))
    }

    #[test]
    fn valid_registry_resolves_names() {
        let registry = ControllerRegistry::from_descriptors(vec![
            desc("safe_hold", ControllerKind::Safe),
            desc("normal", ControllerKind::Commanding),
            desc("parkour", ControllerKind::Commanding),
        ])
        .unwrap();

        assert_eq!(registry.len(), 3);
        assert_eq!(registry.safe().name, "safe_hold");
        assert_eq!(registry.get("parkour").unwrap().kind, ControllerKind::Commanding);
    }

    #[test]
    fn unknown_name_is_reported() {
        let registry =
            ControllerRegistry::from_descriptors(vec![desc("safe_hold", ControllerKind::Safe)])
                .unwrap();
        assert!(matches!(
            registry.get("moonwalk"),
            Err(SupervisorError::UnknownController(name)) if name == "moonwalk"
        ));
    }

    #[test]
    fn empty_registry_is_rejected() {
        assert!(matches!(
            ControllerRegistry::from_descriptors(vec![]),
            Err(SupervisorError::Config(_))
        ));
    }

    #[test]
    fn missing_safe_controller_is_rejected() {
        let result = ControllerRegistry::from_descriptors(vec![
            desc("normal", ControllerKind::Commanding),
        ]);
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn second_safe_controller_is_rejected() {
        let result = ControllerRegistry::from_descriptors(vec![
            desc("safe_hold", ControllerKind::Safe),
            desc("safe_crouch", ControllerKind::Safe),
        ]);
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn duplicate_name_is_rejected() {
        let result = ControllerRegistry::from_descriptors(vec![
            desc("safe_hold", ControllerKind::Safe),
            desc("normal", ControllerKind::Commanding),
            desc("normal", ControllerKind::Commanding),
        ]);
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }

    #[test]
    fn empty_name_is_rejected() {
        let result = ControllerRegistry::from_descriptors(vec![
            desc("", ControllerKind::Safe),
        ]);
        assert!(matches!(result, Err(SupervisorError::Config(_))));
    }
}
