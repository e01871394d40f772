//! Shared test infrastructure for integration tests.
#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// A project tree in a temporary directory.
pub struct ProjectTree {
    pub dir: TempDir,
}

impl ProjectTree {
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    /// Write `content` at `rel`, creating parent directories.
    pub fn write(&self, rel: &str, content: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().expect("parent")).expect("create dirs");
        fs::write(&path, content).expect("write file");
        path
    }

    pub fn write_manifest(&self, manifest: &serde_json::Value) -> PathBuf {
        self.write(
            ".penhance/project.json",
            &serde_json::to_string_pretty(manifest).expect("serialize manifest"),
        )
    }

    pub fn write_config(&self, config: &serde_json::Value) -> PathBuf {
        self.write(
            ".penhance/config.json",
            &serde_json::to_string_pretty(config).expect("serialize config"),
        )
    }

    pub fn read_json(&self, rel: &str) -> serde_json::Value {
        let text = fs::read_to_string(self.path(rel)).expect("read json");
        serde_json::from_str(&text).expect("parse json")
    }

    /// Two units: `model` (descriptor + annotated entity) and `app`
    /// (depends on `model`, nothing to enhance).
    pub fn two_unit_project() -> Self {
        let tree = Self::empty();
        tree.write(
            "model/out/META-INF/mapping.orm",
            r#"<entity-mappings>
  <package>shop</package>
  <entity class="Order"/>
  <entity class="Missing"/>
</entity-mappings>"#,
        );
        tree.write("model/out/shop/Order.class", "cafebabe");
        tree.write("model/out/shop/Customer.class", "cafebabe");
        tree.write(
            "model/src/shop/Customer.java",
            "package shop;\n\nimport jakarta.persistence.Entity;\n\n@Entity\npublic class Customer {\n}\n",
        );
        tree.write("app/out/app/Main.class", "cafebabe");
        tree.write_manifest(&serde_json::json!({
            "units": [
                {
                    "name": "model",
                    "output_dir": "model/out",
                    "content_roots": ["model"],
                    "source_roots": ["model/src"],
                    "libraries": ["lib/openjpa-4.0.jar"]
                },
                {
                    "name": "app",
                    "output_dir": "app/out",
                    "content_roots": ["app"],
                    "dependencies": ["model"]
                }
            ]
        }));
        tree
    }
}

/// Run the `penhance` binary with `args`, logging disabled.
pub fn penhance(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_penhance"))
        .args(args)
        .env("PENHANCE_LOG", "off")
        .output()
        .expect("run penhance")
}

pub fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Install a fake enhancer script that appends to every `*.class` argument
/// and records its arguments in `args.txt` next to itself.
#[cfg(unix)]
pub fn fake_enhancer(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.join("bin/fake-enhancer");
    fs::create_dir_all(path.parent().expect("parent")).expect("create bin");
    fs::write(
        &path,
        "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/args.txt\"\nfor arg in \"$@\"; do\n  case \"$arg\" in\n    *.class) printf 'enhanced' >> \"$arg\" ;;\n  esac\ndone\n",
    )
    .expect("write enhancer");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod enhancer");
    path
}
