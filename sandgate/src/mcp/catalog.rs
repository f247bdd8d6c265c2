//! Static catalog of callable capabilities
//!
//! The catalog is plain data: names, descriptions and argument schemas.
//! Order is fixed at compile time so `tools/list` is stable for the whole
//! process lifetime.

use serde_json::{json, Map, Value};

/// JSON type accepted for a parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Boolean,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
        }
    }
}

/// Backend operation a descriptor maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    ReadFile,
    WriteFile,
    AppendFile,
    ListFiles,
    DeleteFile,
    CreateDirectory,
    HashFile,
    GitStatus,
    GitCommit,
    GitPush,
    GitPull,
    GitLog,
}

/// One named parameter of a capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamType,
    pub required: bool,
    pub description: &'static str,
}

/// Description of a callable capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityDescriptor {
    pub capability: Capability,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

const fn required(name: &'static str, kind: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: true,
        description,
    }
}

const fn optional(name: &'static str, kind: ParamType, description: &'static str) -> ParamSpec {
    ParamSpec {
        name,
        kind,
        required: false,
        description,
    }
}

const PATH: ParamSpec = required("path", ParamType::String, "Path relative to the workspace root");
const CONTENT: ParamSpec = required("content", ParamType::String, "Text content");

static CATALOG: [CapabilityDescriptor; 12] = [
    CapabilityDescriptor {
        capability: Capability::ReadFile,
        name: "read_file",
        description: "Read a text file from the workspace",
        params: &[PATH],
    },
    CapabilityDescriptor {
        capability: Capability::WriteFile,
        name: "write_file",
        description: "Create or overwrite a file in the workspace",
        params: &[PATH, CONTENT],
    },
    CapabilityDescriptor {
        capability: Capability::AppendFile,
        name: "append_file",
        description: "Append text to a file, creating it if missing",
        params: &[PATH, CONTENT],
    },
    CapabilityDescriptor {
        capability: Capability::ListFiles,
        name: "list_files",
        description: "List the entries of a workspace directory",
        params: &[optional(
            "path",
            ParamType::String,
            "Directory relative to the workspace root (default \".\")",
        )],
    },
    CapabilityDescriptor {
        capability: Capability::DeleteFile,
        name: "delete_file",
        description: "Delete a file or an empty directory",
        params: &[PATH],
    },
    CapabilityDescriptor {
        capability: Capability::CreateDirectory,
        name: "create_directory",
        description: "Create a directory and any missing parents",
        params: &[PATH],
    },
    CapabilityDescriptor {
        capability: Capability::HashFile,
        name: "hash_file",
        description: "Compute the SHA-256 digest of a file",
        params: &[PATH],
    },
    CapabilityDescriptor {
        capability: Capability::GitStatus,
        name: "git_status",
        description: "Show the working tree status of the workspace repository",
        params: &[],
    },
    CapabilityDescriptor {
        capability: Capability::GitCommit,
        name: "git_commit",
        description: "Stage all changes and commit them",
        params: &[required("message", ParamType::String, "Commit message")],
    },
    CapabilityDescriptor {
        capability: Capability::GitPush,
        name: "git_push",
        description: "Push a branch to the configured remote",
        params: &[optional(
            "branch",
            ParamType::String,
            "Branch to push (default: current branch)",
        )],
    },
    CapabilityDescriptor {
        capability: Capability::GitPull,
        name: "git_pull",
        description: "Pull a branch from the configured remote",
        params: &[optional(
            "branch",
            ParamType::String,
            "Branch to pull (default: current branch)",
        )],
    },
    CapabilityDescriptor {
        capability: Capability::GitLog,
        name: "git_log",
        description: "Show the most recent commits",
        params: &[optional(
            "limit",
            ParamType::Integer,
            "Number of commits to return (default 10)",
        )],
    },
];

/// All capabilities, in stable order
pub fn list_capabilities() -> &'static [CapabilityDescriptor] {
    &CATALOG
}

/// Look up a capability by name
pub fn find_capability(name: &str) -> Option<&'static CapabilityDescriptor> {
    CATALOG.iter().find(|c| c.name == name)
}

impl CapabilityDescriptor {
    /// JSON Schema for input parameters, in MCP `inputSchema` form
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in self.params {
            properties.insert(
                p.name.to_string(),
                json!({ "type": p.kind.as_str(), "description": p.description }),
            );
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false
        })
    }

    /// MCP tool definition as returned by `tools/list`
    pub fn to_tool_definition(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema()
        })
    }

    /// Check `arguments` against the parameter schema.
    ///
    /// `null` is treated as an empty object. Unknown keys, missing required
    /// keys and type mismatches are rejected.
    pub fn validate<'a>(&self, arguments: &'a Value) -> Result<Arguments<'a>, String> {
        static EMPTY: std::sync::OnceLock<Map<String, Value>> = std::sync::OnceLock::new();
        let map = match arguments {
            Value::Object(map) => map,
            Value::Null => EMPTY.get_or_init(Map::new),
            other => {
                return Err(format!(
                    "arguments for '{}' must be an object, got {}",
                    self.name,
                    json_type(other)
                ))
            }
        };

        if let Some(unknown) = map
            .keys()
            .find(|k| !self.params.iter().any(|p| p.name == k.as_str()))
        {
            return Err(format!(
                "unknown parameter '{}' for '{}'",
                unknown, self.name
            ));
        }

        for p in self.params {
            match map.get(p.name) {
                None | Some(Value::Null) if p.required => {
                    return Err(format!("missing required parameter: {}", p.name));
                }
                Some(v) if !v.is_null() && !p.kind.accepts(v) => {
                    return Err(format!(
                        "parameter '{}' must be {}, got {}",
                        p.name,
                        p.kind.as_str(),
                        json_type(v)
                    ));
                }
                _ => {}
            }
        }

        Ok(Arguments { map })
    }
}

/// Arguments that passed schema validation
#[derive(Debug, Clone, Copy)]
pub struct Arguments<'a> {
    map: &'a Map<String, Value>,
}

impl<'a> Arguments<'a> {
    pub fn str(&self, name: &str) -> Option<&'a str> {
        self.map.get(name).and_then(Value::as_str)
    }

    /// Signed integer argument; values above `i64::MAX` saturate.
    pub fn int(&self, name: &str) -> Option<i64> {
        let value = self.map.get(name)?;
        value
            .as_i64()
            .or_else(|| value.as_u64().map(|_| i64::MAX))
    }
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_order_is_stable() {
        let first: Vec<&str> = list_capabilities().iter().map(|c| c.name).collect();
        let second: Vec<&str> = list_capabilities().iter().map(|c| c.name).collect();
        assert_eq!(first, second);
        assert_eq!(first[0], "read_file");
        assert_eq!(first.len(), 12);
    }

    #[test]
    fn test_names_are_unique() {
        let mut names: Vec<&str> = list_capabilities().iter().map(|c| c.name).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), list_capabilities().len());
    }

    #[test]
    fn test_input_schema() {
        let write = find_capability("write_file").unwrap();
        let schema = write.input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["path"]["type"], "string");
        assert_eq!(schema["required"], json!(["path", "content"]));

        let status = find_capability("git_status").unwrap();
        assert_eq!(status.input_schema()["required"], json!([]));
    }

    #[test]
    fn test_validate_missing_required() {
        let read = find_capability("read_file").unwrap();
        let err = read.validate(&json!({})).unwrap_err();
        assert_eq!(err, "missing required parameter: path");
    }

    #[test]
    fn test_validate_rejects_extra_fields() {
        let read = find_capability("read_file").unwrap();
        let err = read
            .validate(&json!({"path": "a.txt", "mode": "rw"}))
            .unwrap_err();
        assert!(err.contains("unknown parameter 'mode'"));
    }

    #[test]
    fn test_validate_type_mismatch() {
        let log = find_capability("git_log").unwrap();
        let err = log.validate(&json!({"limit": "ten"})).unwrap_err();
        assert_eq!(err, "parameter 'limit' must be integer, got string");

        let err = log.validate(&json!(["limit"])).unwrap_err();
        assert!(err.contains("must be an object"));
    }

    #[test]
    fn test_validate_accepts_null_and_optional() {
        let list = find_capability("list_files").unwrap();
        let args = list.validate(&Value::Null).unwrap();
        assert_eq!(args.str("path"), None);

        let value = json!({"path": "docs"});
        let args = list.validate(&value).unwrap();
        assert_eq!(args.str("path"), Some("docs"));
    }

    #[test]
    fn test_unknown_capability() {
        assert!(find_capability("format_disk").is_none());
    }
}
