// ABOUTME: Turns a SessionConfig into a self-contained Docker build context
// The context holds a single Dockerfile and is packed into an in-memory tar for the engine

pub mod languages;

use crate::config::{SessionConfig, Shell};
use std::fmt::Write as _;
use std::io;

pub const DOCKERFILE_NAME: &str = "Dockerfile";

const CODE_SERVER_THEME: &str = "Default Dark Modern";

/// A buildable specification: one named definition file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildContext {
    pub dockerfile: String,
}

impl BuildContext {
    pub fn new(dockerfile: impl Into<String>) -> Self {
        Self {
            dockerfile: dockerfile.into(),
        }
    }

    pub fn dockerfile_name(&self) -> &'static str {
        DOCKERFILE_NAME
    }

    /// Packs the Dockerfile into an uncompressed tar archive.
    pub fn to_tar(&self) -> io::Result<Vec<u8>> {
        let mut builder = tar::Builder::new(Vec::new());
        let contents = self.dockerfile.as_bytes();

        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();

        builder.append_data(&mut header, DOCKERFILE_NAME, contents)?;
        builder.into_inner()
    }
}

/// Renders the Dockerfile for `config`.
pub fn generate(config: &SessionConfig) -> BuildContext {
    let shell = config.shell();
    let has_java = config.has_language("java");
    let mut out = String::new();

    out.push_str(BASE_SYSTEM);
    match shell {
        Shell::Zsh => out.push_str("    zsh \\\n"),
        Shell::Fish => out.push_str("    fish \\\n"),
        Shell::Bash => {}
    }
    out.push_str("    && rm -rf /var/lib/apt/lists/*\n\n");
    out.push_str(DOCKER_AND_GH_CLI);

    if config.code_server {
        out.push_str("# Install code-server (VS Code in browser)\n");
        out.push_str("RUN curl -fsSL https://code-server.dev/install.sh | sh\n\n");
    }

    let _ = writeln!(
        out,
        "# Create non-root user for development\n\
         RUN useradd -m -s {} developer \\\n    \
         && echo \"developer ALL=(ALL) NOPASSWD:ALL\" >> /etc/sudoers\n\n\
         # Add developer to docker group for socket access\n\
         RUN groupadd -f docker && usermod -aG docker developer\n",
        shell.path()
    );

    if shell == Shell::Zsh {
        out.push_str(OH_MY_ZSH);
    }

    out.push_str(ENTRYPOINT_AND_MISE);

    if has_java {
        out.push_str("# Install SDKMAN for Java and JVM tools\n");
        out.push_str("RUN curl -s \"https://get.sdkman.io?rcupdate=false\" | bash\n\n");
    }

    out.push_str(&shell_activation(shell, has_java));
    out.push('\n');

    for (language, language_config) in &config.languages {
        out.push_str(&languages::language_install(language, language_config));
        out.push_str("\n\n");
    }

    if !config.has_language("node") {
        out.push_str("# Install Node.js LTS for AI agents (required even if not explicitly configured)\n");
        out.push_str("RUN mise use --global node@lts\n\n");
    }

    out.push_str("# Install AI agents via npm\n");
    out.push_str("RUN eval \"$(~/.local/bin/mise activate bash)\" && npm install -g @anthropic-ai/claude-code @google/gemini-cli openai\n\n");

    for (language, language_config) in &config.languages {
        if let Some(install) = languages::build_system_install(language, language_config) {
            out.push_str(&install);
            out.push_str("\n\n");
        }
    }

    if config.code_server {
        out.push_str(&code_server_setup(config));
    }

    out.push_str("WORKDIR /workspace\n\n");

    for (key, value) in &config.env {
        let _ = writeln!(out, "ENV {}=\"{}\"", key, value.replace('"', "\\\""));
    }
    if !config.env.is_empty() {
        out.push('\n');
    }

    let _ = writeln!(out, "CMD [\"{}\"]", shell.path());

    BuildContext::new(out)
}

fn shell_activation(shell: Shell, has_java: bool) -> String {
    let sdkman = |rc: &str| {
        if has_java {
            format!(" && echo 'source ~/.sdkman/bin/sdkman-init.sh' >> {}", rc)
        } else {
            String::new()
        }
    };

    match shell {
        Shell::Bash => format!(
            "RUN echo 'eval \"$(~/.local/bin/mise activate bash)\"' >> ~/.bashrc{}\n",
            sdkman("~/.bashrc")
        ),
        Shell::Zsh => format!(
            "RUN echo 'eval \"$(~/.local/bin/mise activate zsh)\"' >> ~/.zshrc{}\n",
            sdkman("~/.zshrc")
        ),
        Shell::Fish => format!(
            "RUN mkdir -p ~/.config/fish && echo 'mise activate fish | source' >> ~/.config/fish/config.fish{}\n",
            sdkman("~/.config/fish/config.fish")
        ),
    }
}

fn code_server_setup(config: &SessionConfig) -> String {
    let port = config.code_server_port();
    let mut out = String::new();

    let _ = writeln!(out, "# Configure code-server port\nENV CODE_SERVER_PORT={}\n", port);
    let _ = writeln!(
        out,
        "RUN mkdir -p /home/developer/.config/code-server \\\n    \
         && echo 'bind-addr: 0.0.0.0:{}' > /home/developer/.config/code-server/config.yaml \\\n    \
         && echo 'auth: none' >> /home/developer/.config/code-server/config.yaml \\\n    \
         && echo 'cert: false' >> /home/developer/.config/code-server/config.yaml\n",
        port
    );
    let _ = writeln!(
        out,
        "RUN mkdir -p /home/developer/.local/share/code-server/User \\\n    \
         && echo '{{\"workbench.colorTheme\": \"{}\"}}' > /home/developer/.local/share/code-server/User/settings.json\n",
        CODE_SERVER_THEME
    );

    let mut extensions: Vec<&str> = Vec::new();
    for language in config.languages.keys() {
        for extension in languages::extensions_for(language) {
            if !extensions.contains(extension) {
                extensions.push(extension);
            }
        }
    }
    if !extensions.is_empty() {
        let installs: Vec<String> = extensions
            .iter()
            .map(|e| format!("code-server --install-extension {}", e))
            .collect();
        let _ = writeln!(
            out,
            "# Install VS Code extensions for configured languages\nRUN {}\n",
            installs.join(" && ")
        );
    }

    out
}

const BASE_SYSTEM: &str = r#"FROM debian:bookworm-slim

ENV DEBIAN_FRONTEND=noninteractive

# Nested Docker through the mounted host socket
ENV DOCKER_HOST=unix:///var/run/docker.sock
ENV TESTCONTAINERS_DOCKER_SOCKET_OVERRIDE=/var/run/docker.sock
ENV TESTCONTAINERS_HOST_OVERRIDE=host.docker.internal
ENV TESTCONTAINERS_RYUK_DISABLED=true

RUN apt-get update && apt-get install -y --no-install-recommends \
    ca-certificates \
    curl \
    wget \
    git \
    build-essential \
    openssh-client \
    gnupg \
    lsb-release \
    sudo \
    vim \
    less \
    jq \
    unzip \
    zip \
    procps \
    libssl-dev \
    zlib1g-dev \
    libbz2-dev \
    libreadline-dev \
    libsqlite3-dev \
    libffi-dev \
"#;

const DOCKER_AND_GH_CLI: &str = r#"# Docker CLI
RUN curl -fsSL https://download.docker.com/linux/debian/gpg | gpg --dearmor -o /usr/share/keyrings/docker-archive-keyring.gpg \
    && echo "deb [arch=$(dpkg --print-architecture) signed-by=/usr/share/keyrings/docker-archive-keyring.gpg] https://download.docker.com/linux/debian $(lsb_release -cs) stable" > /etc/apt/sources.list.d/docker.list \
    && apt-get update && apt-get install -y --no-install-recommends docker-ce-cli \
    && rm -rf /var/lib/apt/lists/*

# GitHub CLI
RUN mkdir -p /etc/apt/keyrings \
    && curl -fsSL https://cli.github.com/packages/githubcli-archive-keyring.gpg -o /etc/apt/keyrings/githubcli-archive-keyring.gpg \
    && chmod go+r /etc/apt/keyrings/githubcli-archive-keyring.gpg \
    && echo "deb [arch=$(dpkg --print-architecture) signed-by=/etc/apt/keyrings/githubcli-archive-keyring.gpg] https://cli.github.com/packages stable main" > /etc/apt/sources.list.d/github-cli.list \
    && apt-get update && apt-get install -y gh \
    && rm -rf /var/lib/apt/lists/*

"#;

const OH_MY_ZSH: &str = r#"USER developer
RUN sh -c "$(curl -fsSL https://raw.githubusercontent.com/ohmyzsh/ohmyzsh/master/tools/install.sh)" "" --unattended
USER root

"#;

const ENTRYPOINT_AND_MISE: &str = r#"RUN printf '%s\n' '#!/bin/bash' \
    'if [ -S /var/run/docker.sock ]; then' \
    '  sudo chmod 666 /var/run/docker.sock' \
    'fi' \
    'if command -v code-server > /dev/null 2>&1; then' \
    '  code-server --bind-addr 0.0.0.0:${CODE_SERVER_PORT:-8080} --auth none > /tmp/code-server.log 2>&1 &' \
    'fi' \
    'exec "$@"' > /usr/local/bin/docker-entrypoint.sh \
    && chmod +x /usr/local/bin/docker-entrypoint.sh

ENTRYPOINT ["/usr/local/bin/docker-entrypoint.sh"]

USER developer
WORKDIR /home/developer

SHELL ["/bin/bash", "-c"]

RUN curl https://mise.run | sh
ENV PATH="/home/developer/.local/bin:${PATH}"

"#;
