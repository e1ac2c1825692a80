//! Stack descriptor schema
//!
//! A descriptor tells the pipeline where a runtime distribution, its extra
//! libraries, java agents and control assets live inside the plugin root, and
//! how the deployment root is laid out. Paths in `source`/`archive_dir`
//! fields are relative to the plugin root; paths in `classpath` are relative
//! to runtime-home.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{ProvisionError, ProvisionResult};

/// Root of a stack descriptor (`stack.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackConfig {
    /// Names of the deployment-root children
    #[serde(default)]
    pub layout: LayoutConfig,

    /// Server runtime distribution
    pub runtime: RuntimeConfig,

    /// Per-instance configuration area
    #[serde(default)]
    pub base: BaseConfig,

    /// Java agents, each emitting one options file
    #[serde(default)]
    pub agents: Vec<AgentConfig>,

    /// Java installation lookup and runtime options
    #[serde(default)]
    pub java: JavaConfig,

    /// Control directory contents and generated config keys
    #[serde(default)]
    pub control: ControlConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Generated-app directory, child of the deployment root
    pub genapp_dir: String,
    /// Control directory, child of `genapp_dir`
    pub control_dir: String,
    /// Log directory, child of `genapp_dir`
    pub log_dir: String,
    /// Control library directory, child of `genapp_dir`
    pub lib_dir: String,
    pub tmp_dir: String,
    pub agent_lib_dir: String,
    pub runtime_base: String,
    /// Application archive name inside the package root
    pub application_archive: String,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            genapp_dir: ".genapp".to_string(),
            control_dir: "control".to_string(),
            log_dir: "log".to_string(),
            lib_dir: "lib".to_string(),
            tmp_dir: "tmp".to_string(),
            agent_lib_dir: "javaagent-lib".to_string(),
            runtime_base: "server".to_string(),
            application_archive: "app.war".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Directory holding the runtime archive; empty means the plugin root
    #[serde(default)]
    pub archive_dir: String,

    /// Identifier prefix of the runtime archive
    pub archive: String,

    #[serde(default = "default_archive_extension")]
    pub archive_extension: String,

    /// Where the extracted distribution ends up
    pub home: RuntimeHome,

    /// Library directory inside runtime-home
    #[serde(default = "default_lib_dir")]
    pub lib_dir: String,

    /// Classpath entries relative to runtime-home
    #[serde(default)]
    pub classpath: Vec<String>,

    /// Extra libraries copied into `lib_dir`
    #[serde(default)]
    pub libraries: Vec<ArtifactRef>,
}

/// Location of runtime-home after extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeHome {
    /// Extract into this child of the deployment root.
    Dir(String),
    /// Extract into the deployment root, then pick the unique child
    /// directory starting with this prefix.
    Prefix(String),
}

/// An artifact located by `<artifact>*.<extension>` inside `source`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub source: String,
    pub artifact: String,
    #[serde(default = "default_jar")]
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaseConfig {
    /// Asset directory copied into the deployment root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skeleton: Option<String>,
    /// Asset directory copied into runtime-base
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assets: Option<String>,
    /// Directories under runtime-base created and marked read-write
    pub writable: Vec<String>,
    /// Webapp root under runtime-base receiving the application archive
    pub webapp: String,
}

impl Default for BaseConfig {
    fn default() -> Self {
        Self {
            skeleton: None,
            assets: None,
            writable: vec!["work".to_string(), "logs".to_string()],
            webapp: "webapps/ROOT".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub source: String,
    pub artifact: String,

    #[serde(default = "default_jar")]
    pub extension: String,

    /// Options file written into the control directory
    pub options_file: String,

    /// Template for the companion file handed to the agent
    pub companion: String,

    /// Text placed between `=` and the companion path
    #[serde(default)]
    pub argument_prefix: String,

    /// Extra option templates appended after the agent argument
    #[serde(default)]
    pub extra_options: Vec<String>,

    /// Fail when the companion file does not exist
    #[serde(default)]
    pub require_companion: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JavaConfig {
    /// Metadata section holding `version`
    pub version_namespace: String,
    pub default_version: String,
    /// Version to JAVA_HOME
    pub homes: BTreeMap<String, String>,
    /// Runtime-specific options file in the control directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub runtime_options_file: Option<String>,
    /// Option templates joined with spaces into `runtime_options_file`
    pub runtime_options: Vec<String>,
}

impl Default for JavaConfig {
    fn default() -> Self {
        let homes = [("1.6", "/opt/java6"), ("1.7", "/opt/java7"), ("1.8", "/opt/java8")]
            .into_iter()
            .map(|(version, home)| (version.to_string(), home.to_string()))
            .collect();
        Self {
            version_namespace: "java".to_string(),
            default_version: "1.7".to_string(),
            homes,
            runtime_options_file: None,
            runtime_options: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Asset directory copied into the control directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scripts: Option<String>,
    /// Libraries copied into the generated-app lib directory
    pub libraries: Vec<ControlLibrary>,
    pub home_variable: String,
    pub base_variable: String,
    pub opts_variable: String,
    /// Template for the `opts_variable` value
    pub opts: String,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            scripts: None,
            libraries: Vec::new(),
            home_variable: "catalina_home".to_string(),
            base_variable: "catalina_base".to_string(),
            opts_variable: "catalina_opts".to_string(),
            opts: "-Dport.http={port}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLibrary {
    #[serde(flatten)]
    pub artifact: ArtifactRef,
    /// Version-less symlink created next to the copied library
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn default_archive_extension() -> String {
    "zip".to_string()
}

fn default_lib_dir() -> String {
    "lib".to_string()
}

fn default_jar() -> String {
    crate::artifact::JAR.to_string()
}

impl ArtifactRef {
    pub fn new(source: &str, artifact: &str) -> Self {
        Self {
            source: source.to_string(),
            artifact: artifact.to_string(),
            extension: default_jar(),
        }
    }
}

impl Default for StackConfig {
    fn default() -> Self {
        Self::tomcat8()
    }
}

impl StackConfig {
    /// Tomcat 8 clickstack: everything ships flat in the plugin's `lib/`.
    pub fn tomcat8() -> Self {
        let libraries = [
            "cloudbees-web-container-extras",
            "genapp-setup-tomcat8",
            "mysql-connector-java",
            "postgresql",
            "mail",
            "activation",
        ]
        .into_iter()
        .map(|artifact| ArtifactRef::new("lib", artifact))
        .collect();

        Self {
            layout: LayoutConfig::default(),
            runtime: RuntimeConfig {
                archive_dir: "lib".to_string(),
                archive: "tomcat8".to_string(),
                archive_extension: default_archive_extension(),
                home: RuntimeHome::Dir("tomcat8".to_string()),
                lib_dir: default_lib_dir(),
                classpath: tomcat_classpath(),
                libraries,
            },
            base: BaseConfig {
                assets: Some("server".to_string()),
                ..BaseConfig::default()
            },
            agents: vec![
                AgentConfig {
                    source: "lib".to_string(),
                    artifact: "run-javaagent".to_string(),
                    extension: default_jar(),
                    options_file: "java-opts-20-java-agent".to_string(),
                    companion: "{control_dir}/env".to_string(),
                    argument_prefix: "sys_prop:".to_string(),
                    extra_options: Vec::new(),
                    require_companion: false,
                },
                AgentConfig {
                    source: "lib".to_string(),
                    artifact: "jmxtrans-agent".to_string(),
                    extension: default_jar(),
                    options_file: "java-opts-60-jmxtrans-agent".to_string(),
                    companion: "{runtime_base}/conf/tomcat8-metrics.xml".to_string(),
                    argument_prefix: String::new(),
                    extra_options: vec![
                        "-Dtomcat8_metrics_data_file={log_dir}/tomcat8-metrics.data".to_string(),
                    ],
                    require_companion: true,
                },
            ],
            java: JavaConfig {
                version_namespace: "javaHome".to_string(),
                ..JavaConfig::default()
            },
            control: ControlConfig {
                scripts: Some("control".to_string()),
                libraries: vec![ControlLibrary {
                    artifact: ArtifactRef::new("lib", "cloudbees-jmx-invoker"),
                    link: None,
                }],
                ..ControlConfig::default()
            },
        }
    }

    /// Tomcat 7 clickstack: `deps/*` layout, versioned `apache-tomcat-*`
    /// home and a `dist` skeleton.
    pub fn tomcat7() -> Self {
        Self {
            layout: LayoutConfig {
                runtime_base: "catalina-base".to_string(),
                ..LayoutConfig::default()
            },
            runtime: RuntimeConfig {
                archive_dir: String::new(),
                archive: "tomcat".to_string(),
                archive_extension: default_archive_extension(),
                home: RuntimeHome::Prefix("apache-tomcat".to_string()),
                lib_dir: default_lib_dir(),
                classpath: tomcat_classpath(),
                libraries: vec![
                    ArtifactRef::new("deps/tomcat-lib", "cloudbees-web-container-extras"),
                    ArtifactRef::new("deps/tomcat-lib-mysql", "mysql-connector-java"),
                    ArtifactRef::new("deps/tomcat-lib-postgresql", "postgresql"),
                    ArtifactRef::new("deps/tomcat-lib-mail", "mail"),
                ],
            },
            base: BaseConfig {
                skeleton: Some("dist".to_string()),
                ..BaseConfig::default()
            },
            agents: vec![
                AgentConfig {
                    source: "deps/javaagent-lib".to_string(),
                    artifact: "cloudbees-clickstack-javaagent".to_string(),
                    extension: default_jar(),
                    options_file: "java-opts-20-javaagent".to_string(),
                    companion: "{control_dir}/env".to_string(),
                    argument_prefix: "sys_prop:".to_string(),
                    extra_options: Vec::new(),
                    require_companion: false,
                },
                AgentConfig {
                    source: "deps/javaagent-lib".to_string(),
                    artifact: "jmxtrans-agent".to_string(),
                    extension: default_jar(),
                    options_file: "java-opts-60-jmxtrans-agent".to_string(),
                    companion: "{runtime_base}/conf/tomcat-metrics.xml".to_string(),
                    argument_prefix: String::new(),
                    extra_options: vec![
                        "-Dtomcat_metrics_data_file={log_dir}/tomcat-metrics.data".to_string(),
                    ],
                    require_companion: true,
                },
            ],
            java: JavaConfig {
                runtime_options_file: Some("java-opts-20-tomcat-opts".to_string()),
                runtime_options: vec![
                    "-Djava.io.tmpdir=\"{tmp_dir}\"".to_string(),
                    "-Dcatalina.home=\"{runtime_home}\"".to_string(),
                    "-Dcatalina.base=\"{runtime_base}\"".to_string(),
                    "-Djava.util.logging.manager=org.apache.juli.ClassLoaderLogManager".to_string(),
                    "-Djava.util.logging.config.file=\"{runtime_base}/conf/logging.properties\""
                        .to_string(),
                ],
                ..JavaConfig::default()
            },
            control: ControlConfig {
                scripts: None,
                libraries: vec![ControlLibrary {
                    artifact: ArtifactRef::new("deps/control-lib", "cloudbees-jmx-invoker"),
                    link: Some("cloudbees-jmx-invoker-jar-with-dependencies.jar".to_string()),
                }],
                ..ControlConfig::default()
            },
        }
    }

    /// Reject descriptors the pipeline cannot act on.
    pub fn validate(&self) -> ProvisionResult<()> {
        require_name("runtime.archive", &self.runtime.archive)?;
        match &self.runtime.home {
            RuntimeHome::Dir(dir) => require_relative("runtime.home.dir", dir)?,
            RuntimeHome::Prefix(prefix) => require_name("runtime.home.prefix", prefix)?,
        }

        let layout = [
            ("layout.genapp_dir", &self.layout.genapp_dir),
            ("layout.control_dir", &self.layout.control_dir),
            ("layout.log_dir", &self.layout.log_dir),
            ("layout.lib_dir", &self.layout.lib_dir),
            ("layout.tmp_dir", &self.layout.tmp_dir),
            ("layout.agent_lib_dir", &self.layout.agent_lib_dir),
            ("layout.runtime_base", &self.layout.runtime_base),
            ("base.webapp", &self.base.webapp),
        ];
        for (field, value) in layout {
            require_relative(field, value)?;
        }
        require_name("layout.application_archive", &self.layout.application_archive)?;

        for (index, agent) in self.agents.iter().enumerate() {
            require_name(&format!("agents[{index}].artifact"), &agent.artifact)?;
            require_name(&format!("agents[{index}].options_file"), &agent.options_file)?;
        }
        if let Some(file) = &self.java.runtime_options_file {
            require_name("java.runtime_options_file", file)?;
        }
        if !self.java.homes.contains_key(&self.java.default_version) {
            return Err(ProvisionError::config(
                "java.default_version",
                format!("no home configured for version '{}'", self.java.default_version),
            ));
        }
        for (index, library) in self.control.libraries.iter().enumerate() {
            if let Some(link) = &library.link {
                require_name(&format!("control.libraries[{index}].link"), link)?;
            }
        }
        Ok(())
    }
}

fn tomcat_classpath() -> Vec<String> {
    vec![
        "bin/bootstrap.jar".to_string(),
        "bin/tomcat-juli.jar".to_string(),
        "lib".to_string(),
    ]
}

/// A single non-empty path component.
fn require_name(field: &str, value: &str) -> ProvisionResult<()> {
    if value.is_empty() || value.contains(['/', '\\']) || value == "." || value == ".." {
        return Err(ProvisionError::config(
            field,
            format!("'{value}' must be a plain file name"),
        ));
    }
    Ok(())
}

/// A non-empty relative path that stays below its parent.
fn require_relative(field: &str, value: &str) -> ProvisionResult<()> {
    let path = std::path::Path::new(value);
    let escapes = path
        .components()
        .any(|c| !matches!(c, std::path::Component::Normal(_)));
    if value.is_empty() || escapes {
        return Err(ProvisionError::config(
            field,
            format!("'{value}' must be a relative path without '..'"),
        ));
    }
    Ok(())
}
