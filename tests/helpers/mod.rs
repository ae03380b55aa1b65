use std::fs;
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::TempDir;
use vhostctl::ProjectContext;
use vhostctl::cli::{CommonArgs, CreateArgs, LogLevel};
use vhostctl::executor::{CommandExecutor, CommandSpec, ExecutionResult};
use vhostctl::prompt::Prompt;

/// Executor standing in for the host.
///
/// Records every spec, answers the privilege check from `privileged`,
/// performs `mv` with `fs::rename`, and reports a non-zero exit for any
/// command listed in `failing`. With `dry_run` set it behaves like the
/// real executor in dry-run mode: only read-only specs are answered.
#[allow(dead_code)]
pub struct HostExecutor {
    pub privileged: bool,
    pub failing: Vec<&'static str>,
    pub dry_run: bool,
    calls: Mutex<Vec<CommandSpec>>,
}

#[allow(dead_code)]
impl HostExecutor {
    pub fn new() -> Self {
        Self {
            privileged: true,
            failing: Vec::new(),
            dry_run: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unprivileged() -> Self {
        Self {
            privileged: false,
            ..Self::new()
        }
    }

    pub fn dry_run(privileged: bool) -> Self {
        Self {
            privileged,
            dry_run: true,
            ..Self::new()
        }
    }

    pub fn failing(commands: &[&'static str]) -> Self {
        Self {
            failing: commands.to_vec(),
            ..Self::new()
        }
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().unwrap().clone()
    }

    /// Command names in call order (without the privilege wrapper).
    pub fn commands(&self) -> Vec<String> {
        self.calls().into_iter().map(|spec| spec.command).collect()
    }

    pub fn find(&self, command: &str) -> Option<CommandSpec> {
        self.calls().into_iter().find(|spec| spec.command == command)
    }
}

fn is_privilege_check(spec: &CommandSpec) -> bool {
    matches!(spec.command.as_str(), "sudo" | "doas") && spec.args == ["-n", "true"]
}

impl CommandExecutor for HostExecutor {
    fn execute(&self, spec: &CommandSpec) -> anyhow::Result<ExecutionResult> {
        self.calls.lock().unwrap().push(spec.clone());
        if self.dry_run && !spec.read_only {
            return Ok(ExecutionResult::default());
        }

        let ok = if is_privilege_check(spec) {
            self.privileged
        } else if self.failing.contains(&spec.command.as_str()) {
            false
        } else {
            if spec.command == "mv" {
                fs::rename(&spec.args[1], &spec.args[2])?;
            }
            true
        };

        Ok(ExecutionResult {
            status: Some(ExitStatus::from_raw(if ok { 0 } else { 1 << 8 })),
            output: if ok {
                String::new()
            } else {
                format!("{} failed\n", spec.command)
            },
        })
    }
}

/// Prompt answering every confirmation with `answer` and recording output.
#[allow(dead_code)]
pub struct ScriptedPrompt {
    pub answer: bool,
    pub questions: Mutex<Vec<String>>,
    pub messages: Mutex<Vec<(&'static str, String)>>,
}

#[allow(dead_code)]
impl ScriptedPrompt {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            questions: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
        }
    }

    pub fn questions(&self) -> Vec<String> {
        self.questions.lock().unwrap().clone()
    }

    pub fn messages(&self, kind: &str) -> Vec<String> {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, m)| m.clone())
            .collect()
    }

    fn record(&self, kind: &'static str, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }
}

impl Prompt for ScriptedPrompt {
    fn confirm(&self, message: &str, _default: bool) -> anyhow::Result<bool> {
        self.questions.lock().unwrap().push(message.to_string());
        Ok(self.answer)
    }

    fn info(&self, message: &str) {
        self.record("info", message);
    }

    fn success(&self, message: &str) {
        self.record("success", message);
    }

    fn warning(&self, message: &str) {
        self.record("warning", message);
    }

    fn error(&self, message: &str) {
        self.record("error", message);
    }
}

/// A scratch host: a system root with web server directories, a project
/// directory named `myapp` holding the settings file, and a staging dir.
#[allow(dead_code)]
pub struct Fixture {
    _dir: TempDir,
    pub base: Utf8PathBuf,
    pub root: Utf8PathBuf,
    pub project: ProjectContext,
    pub staging_path: Utf8PathBuf,
    pub lock_dir: Utf8PathBuf,
}

#[allow(dead_code)]
impl Fixture {
    pub fn new(settings_yaml: &str) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let base = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");

        let root = base.join("sysroot");
        for conf_dir in ["etc/nginx/conf.d", "etc/httpd/conf.d", "etc/apache2/sites-available"] {
            fs::create_dir_all(root.join(conf_dir)).unwrap();
        }

        let project_dir = base.join("myapp");
        let settings_path = project_dir.join("config/packages/castor.yaml");
        fs::create_dir_all(settings_path.parent().unwrap()).unwrap();
        fs::write(&settings_path, settings_yaml).unwrap();

        let staging_dir = base.join("tmp");
        fs::create_dir_all(&staging_dir).unwrap();
        let lock_dir = base.join("lock");
        fs::create_dir_all(&lock_dir).unwrap();

        Self {
            _dir: dir,
            base,
            root,
            project: ProjectContext {
                dir: project_dir,
                settings_path,
            },
            staging_path: staging_dir.join("vhost.conf"),
            lock_dir,
        }
    }

    pub fn create_args(&self) -> CreateArgs {
        CreateArgs {
            common: CommonArgs {
                file: Some(self.project.settings_path.clone()),
                project_dir: Some(self.project.dir.clone()),
                log_level: LogLevel::Error,
            },
            dry_run: false,
            yes: false,
            staging_path: self.staging_path.clone(),
            lock_dir: self.lock_dir.clone(),
            root: self.root.clone(),
            reload_timeout: 5,
        }
    }

    /// Path of a live configuration file, e.g. `etc/nginx/conf.d/demo.local.conf`.
    pub fn live(&self, relative: &str) -> Utf8PathBuf {
        self.root.join(relative)
    }

    pub fn read(&self, path: &Utf8Path) -> String {
        fs::read_to_string(path).unwrap_or_else(|e| panic!("failed to read {}: {}", path, e))
    }

    /// Lists entries in the staging directory (staging file, staging lock).
    pub fn staging_entries(&self) -> Vec<String> {
        list_dir(self.staging_path.parent().unwrap())
    }

    /// Lists entries in the per-host lock directory.
    pub fn lock_entries(&self) -> Vec<String> {
        list_dir(&self.lock_dir)
    }
}

fn list_dir(dir: &Utf8Path) -> Vec<String> {
    let mut entries: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    entries.sort();
    entries
}
