//! Capability package fixtures.
//!
//! A [`PackageFixture`] writes a package directory (`SKILL.md` plus shell
//! scripts) under a test root. Shell tools keep tests free of interpreter
//! dependencies beyond `/bin/sh`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use quiver_package::{CapabilityPackage, load_package};
use serde_json::{Map, Value, json};

/// Shell that reads the invocation and returns `data` as the result.
#[must_use]
pub fn result_script(data: &Value) -> String {
    format!("read -r invoke\necho '@quiver:result {}'\n", json!({ "data": data }))
}

/// Shell that reads the invocation, makes each broker call in order and
/// returns the answers as `{"answers": [...]}`.
#[must_use]
pub fn calls_script(calls: &[Value]) -> String {
    let mut script = String::from("read -r invoke\n");
    let mut args = Vec::with_capacity(calls.len());
    for (i, call) in calls.iter().enumerate() {
        script.push_str(&format!("echo '@quiver:call {call}'\nread -r a{i}\n"));
        args.push(format!("\"$a{i}\""));
    }
    let placeholders = vec!["%s"; calls.len()].join(",");
    script.push_str(&format!(
        "printf '@quiver:result {{\"data\":{{\"answers\":[{placeholders}]}}}}\\n' {}\n",
        args.join(" ")
    ));
    script
}

/// One tool of a [`PackageFixture`].
#[derive(Debug, Clone)]
pub struct ToolFixture {
    definition: Map<String, Value>,
    scripts: Vec<(String, String)>,
}

impl ToolFixture {
    /// A shell tool named `name` running `script`, accepting any object.
    #[must_use]
    pub fn shell(name: &str, script: &str) -> Self {
        let entrypoint = format!("scripts/{name}.sh");
        let mut definition = Map::new();
        definition.insert("name".into(), json!(name));
        definition.insert("description".into(), json!(format!("Test tool {name}")));
        definition.insert("input_schema".into(), json!({ "type": "object" }));
        definition.insert(
            "implementation".into(),
            json!({ "runtime": "shell", "entrypoint": entrypoint }),
        );
        Self {
            definition,
            scripts: vec![(entrypoint, script.to_owned())],
        }
    }

    /// Replace the input schema.
    #[must_use]
    pub fn input_schema(mut self, schema: Value) -> Self {
        self.definition.insert("input_schema".into(), schema);
        self
    }

    /// Declare an output schema.
    #[must_use]
    pub fn output_schema(mut self, schema: Value) -> Self {
        self.definition.insert("output_schema".into(), schema);
        self
    }

    /// Gate the tool at `level` (`none`, `recommended`, `required`).
    #[must_use]
    pub fn confirmation(mut self, level: &str) -> Self {
        self.definition
            .insert("confirmation".into(), json!({ "level": level }));
        self
    }

    /// Per-tool timeout in seconds.
    #[must_use]
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.set_implementation("timeout", json!(secs));
        self
    }

    /// Cleanup hook running `script`.
    #[must_use]
    pub fn cleanup(mut self, script: &str) -> Self {
        let Some(Value::String(name)) = self.definition.get("name").cloned() else {
            return self;
        };
        let path = format!("scripts/{name}-cleanup.sh");
        self.set_implementation("cleanup", json!(path));
        self.scripts.push((path, script.to_owned()));
        self
    }

    fn set_implementation(&mut self, key: &str, value: Value) {
        if let Some(Value::Object(binding)) = self.definition.get_mut("implementation") {
            binding.insert(key.to_owned(), value);
        }
    }
}

/// A capability package written to disk on demand.
#[derive(Debug, Clone)]
pub struct PackageFixture {
    name: String,
    frontmatter: Map<String, Value>,
    tools: Option<Vec<ToolFixture>>,
    body: String,
}

impl PackageFixture {
    /// A minimal valid package named `name` with an empty tool list.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut frontmatter = Map::new();
        frontmatter.insert("spec_version".into(), json!("1"));
        frontmatter.insert("name".into(), json!(name));
        frontmatter.insert("description".into(), json!(format!("Test package {name}")));
        frontmatter.insert("version".into(), json!("1.0.0"));
        Self {
            name: name.to_owned(),
            frontmatter,
            tools: Some(Vec::new()),
            body: format!("# {name}\n\nInstructions for {name}.\n"),
        }
    }

    /// Add a tool.
    #[must_use]
    pub fn tool(mut self, tool: ToolFixture) -> Self {
        self.tools.get_or_insert_with(Vec::new).push(tool);
        self
    }

    /// Omit the `tools` key entirely.
    #[must_use]
    pub fn without_tools(mut self) -> Self {
        self.tools = None;
        self
    }

    /// Selection keywords.
    #[must_use]
    pub fn keywords(self, keywords: &[&str]) -> Self {
        self.trigger("keywords", json!(keywords))
    }

    /// Selection file types.
    #[must_use]
    pub fn file_types(self, file_types: &[&str]) -> Self {
        self.trigger("file_types", json!(file_types))
    }

    /// Selection intents.
    #[must_use]
    pub fn intents(self, intents: &[&str]) -> Self {
        self.trigger("intents", json!(intents))
    }

    /// Selection priority.
    #[must_use]
    pub fn priority(self, priority: i64) -> Self {
        self.trigger("priority", json!(priority))
    }

    /// The `permissions` block, e.g. `json!({"fs_read": ["docs/**"]})`.
    #[must_use]
    pub fn permissions(self, permissions: Value) -> Self {
        self.field("permissions", permissions)
    }

    /// The `safety` block.
    #[must_use]
    pub fn safety(self, safety: Value) -> Self {
        self.field("safety", safety)
    }

    /// Credential names the package may use.
    #[must_use]
    pub fn secrets(self, secrets: &[&str]) -> Self {
        self.field("secrets", json!(secrets))
    }

    /// Set any top-level manifest key.
    #[must_use]
    pub fn field(mut self, key: &str, value: Value) -> Self {
        self.frontmatter.insert(key.to_owned(), value);
        self
    }

    fn trigger(mut self, key: &str, value: Value) -> Self {
        let triggers = self
            .frontmatter
            .entry("triggers")
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(map) = triggers {
            map.insert(key.to_owned(), value);
        }
        self
    }

    /// The `SKILL.md` text this fixture writes.
    ///
    /// # Panics
    ///
    /// Panics if the front matter cannot be rendered as YAML.
    #[must_use]
    pub fn manifest_text(&self) -> String {
        let mut frontmatter = self.frontmatter.clone();
        if let Some(tools) = &self.tools {
            frontmatter.insert(
                "tools".into(),
                Value::Array(
                    tools
                        .iter()
                        .map(|t| Value::Object(t.definition.clone()))
                        .collect(),
                ),
            );
        }
        let yaml = serde_yaml::to_string(&Value::Object(frontmatter))
            .expect("fixture front matter renders");
        format!("---\n{yaml}---\n{}", self.body)
    }

    /// Write the package under `root/<name>` and return its directory.
    ///
    /// # Panics
    ///
    /// Panics if the files cannot be written.
    pub fn write(&self, root: &Path) -> PathBuf {
        let dir = root.join(&self.name);
        std::fs::create_dir_all(&dir).expect("create package dir");
        for tool in self.tools.iter().flatten() {
            for (path, script) in &tool.scripts {
                let target = dir.join(path);
                if let Some(parent) = target.parent() {
                    std::fs::create_dir_all(parent).expect("create script dir");
                }
                std::fs::write(target, script).expect("write script");
            }
        }
        std::fs::write(dir.join("SKILL.md"), self.manifest_text()).expect("write SKILL.md");
        dir
    }

    /// Write and load the package.
    ///
    /// # Panics
    ///
    /// Panics if the package is invalid.
    pub fn load(&self, root: &Path) -> Arc<CapabilityPackage> {
        let dir = self.write(root);
        Arc::new(load_package(&dir).expect("fixture package loads"))
    }
}
