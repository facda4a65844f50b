// ABOUTME: Per-language install steps for the generated Dockerfile
// Mise handles go/node/python/rust/ruby; SDKMAN handles Java and JVM build tools

use crate::config::LanguageConfig;

const MISE_ACTIVATE: &str = r#"eval "$(~/.local/bin/mise activate bash)""#;

pub fn language_install(language: &str, config: &LanguageConfig) -> String {
    let version = config.version();
    match language {
        "go" | "node" | "python" | "rust" | "ruby" => install_with_mise(language, version),
        "java" => install_java(version),
        other => format!("# Unknown language: {}", other),
    }
}

pub fn build_system_install(language: &str, config: &LanguageConfig) -> Option<String> {
    let build_system = config.build_system.as_deref().filter(|b| !b.is_empty())?;
    let version = config
        .build_system_version
        .as_deref()
        .filter(|v| !v.is_empty());

    match (language, build_system) {
        ("node", "yarn") | ("node", "pnpm") => Some(format!(
            "# Install {bs}\nRUN {MISE_ACTIVATE} && npm install -g {bs}",
            bs = build_system
        )),
        ("python", "poetry") => Some(match version {
            Some(v) => format!(
                "# Install Poetry {v}\nRUN {MISE_ACTIVATE} && pip install poetry=={v}"
            ),
            None => format!("# Install Poetry\nRUN {MISE_ACTIVATE} && pip install poetry"),
        }),
        ("python", "pipenv") => Some(format!(
            "# Install Pipenv\nRUN {MISE_ACTIVATE} && pip install pipenv"
        )),
        ("ruby", "bundler") => Some(format!(
            "# Install Bundler\nRUN {MISE_ACTIVATE} && gem install bundler"
        )),
        ("java", tool @ ("gradle" | "maven" | "ant" | "sbt")) => Some(sdk_install(tool, version)),
        // npm, pip, gem and cargo ship with their toolchains
        _ => None,
    }
}

/// Recommended code-server extensions for a language
pub fn extensions_for(language: &str) -> &'static [&'static str] {
    match language {
        "go" => &["golang.go"],
        "node" => &[
            "dbaeumer.vscode-eslint",
            "esbenp.prettier-vscode",
            "ms-vscode.vscode-typescript-next",
        ],
        "python" => &[
            "ms-python.python",
            "ms-python.vscode-pylance",
            "ms-python.debugpy",
        ],
        "java" => &[
            "redhat.java",
            "vscjava.vscode-java-debug",
            "vscjava.vscode-java-dependency",
            "vscjava.vscode-maven",
            "vscjava.vscode-gradle",
        ],
        "rust" => &["rust-lang.rust-analyzer"],
        "ruby" => &["shopify.ruby-lsp"],
        _ => &[],
    }
}

fn install_with_mise(language: &str, version: &str) -> String {
    // "lts" is only meaningful to mise for node
    let mise_version = match version {
        "lts" if language != "node" => "latest",
        other => other,
    };
    format!(
        "# Install {lang} via Mise\nRUN mise use --global {lang}@{ver}",
        lang = language,
        ver = mise_version
    )
}

fn install_java(version: &str) -> String {
    let sdkman_version = match version {
        "" | "latest" | "lts" => "21-tem".to_string(),
        // "21" -> "21-tem"; "21.0.2-tem" is used verbatim
        v if v.len() <= 2 || v.as_bytes().get(2) != Some(&b'.') => format!("{}-tem", v),
        v => v.to_string(),
    };
    format!(
        "# Install Java via SDKMAN\nRUN bash -c \"source ~/.sdkman/bin/sdkman-init.sh && sdk install java {}\"",
        sdkman_version
    )
}

fn sdk_install(tool: &str, version: Option<&str>) -> String {
    let target = match version {
        Some(v) => format!("{} {}", tool, v),
        None => tool.to_string(),
    };
    format!(
        "# Install {target} via SDKMAN\nRUN bash -c \"source ~/.sdkman/bin/sdkman-init.sh && sdk install {target}\"",
        target = target
    )
}
