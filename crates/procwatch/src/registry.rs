use procwatch_core::{Error, ProcessSpec, Result};
use std::collections::HashMap;

/// Insertion-ordered store of process specs. Purely a data structure; the
/// supervisor guards it with its table lock and enforces the
/// stop-before-remove policy, since only the supervisor knows runner states.
#[derive(Default)]
pub struct Registry {
	specs: HashMap<String, ProcessSpec>,
	order: Vec<String>,
}

impl Registry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn add(&mut self, spec: ProcessSpec) -> Result<()> {
		spec.validate()?;
		if self.specs.contains_key(&spec.name) {
			return Err(Error::DuplicateName(spec.name));
		}
		self.order.push(spec.name.clone());
		self.specs.insert(spec.name.clone(), spec);
		Ok(())
	}

	/// Wholesale replacement of an existing spec; keeps its list position.
	pub fn replace(&mut self, spec: ProcessSpec) -> Result<()> {
		spec.validate()?;
		if !self.specs.contains_key(&spec.name) {
			return Err(Error::NotFound(spec.name));
		}
		self.specs.insert(spec.name.clone(), spec);
		Ok(())
	}

	pub fn remove(&mut self, name: &str) -> Result<ProcessSpec> {
		let spec = self
			.specs
			.remove(name)
			.ok_or_else(|| Error::NotFound(name.to_string()))?;
		self.order.retain(|n| n != name);
		Ok(spec)
	}

	pub fn get(&self, name: &str) -> Option<&ProcessSpec> {
		self.specs.get(name)
	}

	pub fn contains(&self, name: &str) -> bool {
		self.specs.contains_key(name)
	}

	/// Names in insertion order, for deterministic list rendering.
	pub fn names(&self) -> impl Iterator<Item = &str> {
		self.order.iter().map(String::as_str)
	}

	pub fn len(&self) -> usize {
		self.order.len()
	}

	pub fn is_empty(&self) -> bool {
		self.order.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn spec(name: &str) -> ProcessSpec {
		ProcessSpec {
			name: name.into(),
			command: "sleep 1".into(),
			working_dir: None,
			env: HashMap::new(),
			auto_restart: false,
		}
	}

	#[test]
	fn add_and_list_in_insertion_order() {
		let mut reg = Registry::new();
		for name in ["web", "worker", "cron"] {
			reg.add(spec(name)).unwrap();
		}
		let names: Vec<&str> = reg.names().collect();
		assert_eq!(names, vec!["web", "worker", "cron"]);
	}

	#[test]
	fn add_duplicate_fails() {
		let mut reg = Registry::new();
		reg.add(spec("web")).unwrap();
		assert!(matches!(reg.add(spec("web")), Err(Error::DuplicateName(_))));
		assert_eq!(reg.len(), 1);
	}

	#[test]
	fn remove_keeps_order_of_rest() {
		let mut reg = Registry::new();
		for name in ["a", "b", "c"] {
			reg.add(spec(name)).unwrap();
		}
		reg.remove("b").unwrap();
		let names: Vec<&str> = reg.names().collect();
		assert_eq!(names, vec!["a", "c"]);
	}

	#[test]
	fn remove_missing_is_not_found() {
		let mut reg = Registry::new();
		assert!(matches!(reg.remove("ghost"), Err(Error::NotFound(_))));
	}

	#[test]
	fn replace_requires_existing() {
		let mut reg = Registry::new();
		assert!(matches!(reg.replace(spec("web")), Err(Error::NotFound(_))));
		reg.add(spec("web")).unwrap();
		let mut updated = spec("web");
		updated.command = "sleep 2".into();
		reg.replace(updated).unwrap();
		assert_eq!(reg.get("web").unwrap().command, "sleep 2");
	}

	#[test]
	fn add_validates_spec() {
		let mut reg = Registry::new();
		let mut bad = spec("web");
		bad.command = String::new();
		assert!(matches!(reg.add(bad), Err(Error::InvalidSpec(_))));
	}
}
