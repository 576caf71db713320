//! Configuração do jobwatch carregada a partir de `jobwatch.toml`.
//!
//! A struct [`WatchConfig`] contém todos os parâmetros configuráveis.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! O arquivo é relido a cada ciclo, então alterações entram em vigor
//! no ciclo seguinte sem reiniciar o processo.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Local convencional do arquivo de configuração.
pub const DEFAULT_CONFIG_PATH: &str = "jobwatch.toml";

/// Variável de ambiente que sobrescreve o local do arquivo.
pub const CONFIG_PATH_ENV: &str = "JOBWATCH_CONFIG";

/// Configuração de nível superior carregada de `jobwatch.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct WatchConfig {
    /// Intervalo de descanso entre ciclos, em segundos.
    #[serde(default = "default_rest_interval_secs")]
    pub rest_interval_secs: i64,

    /// Prazo máximo de um ciclo inteiro, em segundos. `0` desativa.
    #[serde(default = "default_cycle_timeout_secs")]
    pub cycle_timeout_secs: u64,

    /// Arquivo JSON onde o último estado observado é persistido.
    #[serde(default = "default_state_file")]
    pub state_file: Option<PathBuf>,

    /// Reage também a vagas que saíram da listagem.
    #[serde(default)]
    pub notify_closed: bool,

    /// Dias até esquecer uma vaga encerrada. `0` guarda para sempre.
    #[serde(default = "default_prune_closed_after_days")]
    pub prune_closed_after_days: u64,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default)]
    pub sources: SourcesConfig,

    /// Especificação de observação: slugs por plataforma.
    #[serde(default)]
    pub companies: CompaniesConfig,

    #[serde(default)]
    pub filters: FilterConfig,

    #[serde(default)]
    pub tech_filters: TechFilterConfig,

    #[serde(default)]
    pub keywords: KeywordConfig,

    #[serde(default)]
    pub email: EmailSettings,

    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

// Valor padrão para o intervalo de descanso: 600s.
fn default_rest_interval_secs() -> i64 {
    600
}

// Valor padrão para o prazo do ciclo: 900s.
fn default_cycle_timeout_secs() -> u64 {
    900
}

// Valor padrão para a retenção de vagas encerradas: 30 dias.
fn default_prune_closed_after_days() -> u64 {
    30
}

// Valor padrão para o arquivo de estado.
fn default_state_file() -> Option<PathBuf> {
    Some(PathBuf::from("jobwatch-state.json"))
}

/// Parâmetros do cliente HTTP usado para consultar as plataformas.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 4,
            request_timeout_secs: 20,
            user_agent: concat!("jobwatch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// URLs base de cada plataforma. Sobrescrever apenas para proxies ou testes.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    pub greenhouse_base_url: String,
    pub lever_base_url: String,
    pub ashby_base_url: String,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            greenhouse_base_url: "https://boards-api.greenhouse.io".to_string(),
            lever_base_url: "https://api.lever.co".to_string(),
            ashby_base_url: "https://jobs.ashbyhq.com".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CompaniesConfig {
    pub greenhouse: Vec<String>,
    pub lever: Vec<String>,
    pub ashby: Vec<String>,
}

/// Filtros de título, experiência e localização.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub titles_must_include: Vec<String>,
    pub titles_must_not: Vec<String>,
    pub exp_max_years: u32,
    pub exp_must_not_patterns: Vec<String>,
    pub locations_must_not: Vec<String>,
    pub locations_allow_any: Vec<String>,
    pub state_abbrev_regex: Option<String>,
    pub locations_prefer: Vec<String>,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            titles_must_include: Vec::new(),
            titles_must_not: Vec::new(),
            exp_max_years: 5,
            exp_must_not_patterns: Vec::new(),
            locations_must_not: Vec::new(),
            locations_allow_any: Vec::new(),
            state_abbrev_regex: None,
            locations_prefer: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TechFilterConfig {
    pub must_all: Vec<String>,
    pub must_any: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub any: Vec<String>,
    pub must_not: Vec<String>,
}

/// Ajustes do resumo por e-mail. As credenciais SMTP vêm do ambiente.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmailSettings {
    pub enabled: bool,
    pub subject_prefix: String,
    pub from_name: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            subject_prefix: "[NEW JOB]".to_string(),
            from_name: "Job Watcher".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    #[serde(default = "default_source_label")]
    pub source_label: String,
}

fn default_source_label() -> String {
    "jobwatch".to_string()
}

/// Plataforma de vagas suportada.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoardKind {
    Greenhouse,
    Lever,
    Ashby,
}

impl fmt::Display for BoardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoardKind::Greenhouse => write!(f, "greenhouse"),
            BoardKind::Lever => write!(f, "lever"),
            BoardKind::Ashby => write!(f, "ashby"),
        }
    }
}

/// Um quadro de vagas observado: plataforma + slug da empresa.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatchTarget {
    pub kind: BoardKind,
    pub slug: String,
}

impl WatchTarget {
    pub fn new(kind: BoardKind, slug: impl Into<String>) -> Self {
        Self {
            kind,
            slug: slug.into(),
        }
    }
}

/// Formato `plataforma:slug`, também usado como `source` das vagas.
impl fmt::Display for WatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.slug)
    }
}

// Slugs vão direto para a URL; aceita apenas alfanuméricos, hífen, sublinhado e ponto.
fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 128
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
}

impl WatchConfig {
    /// Carrega e valida a configuração do caminho fornecido.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    /// Interpreta e valida uma configuração a partir de texto TOML.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: WatchConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let targets = self.targets();
        if targets.is_empty() {
            return Err(ConfigError::NoTargets);
        }
        if let Some(bad) = targets.iter().find(|t| !is_safe_slug(&t.slug)) {
            return Err(ConfigError::InvalidTarget {
                kind: bad.kind.to_string(),
                slug: bad.slug.clone(),
            });
        }
        Ok(())
    }

    /// Resolve a especificação de observação na ordem greenhouse, lever, ashby.
    pub fn targets(&self) -> Vec<WatchTarget> {
        let c = &self.companies;
        let greenhouse = c.greenhouse.iter().map(|s| (BoardKind::Greenhouse, s));
        let lever = c.lever.iter().map(|s| (BoardKind::Lever, s));
        let ashby = c.ashby.iter().map(|s| (BoardKind::Ashby, s));
        greenhouse
            .chain(lever)
            .chain(ashby)
            .map(|(kind, slug)| WatchTarget::new(kind, slug.trim()))
            .collect()
    }

    /// Caminho do arquivo de estado; `None` (ou vazio) mantém o estado só em memória.
    pub fn state_path(&self) -> Option<&Path> {
        self.state_file
            .as_deref()
            .filter(|p| !p.as_os_str().is_empty())
    }

    pub fn cycle_timeout(&self) -> Option<Duration> {
        (self.cycle_timeout_secs > 0).then(|| Duration::from_secs(self.cycle_timeout_secs))
    }

    /// Idade a partir da qual registros encerrados são descartados.
    pub fn prune_closed_after(&self) -> Option<chrono::Duration> {
        if self.prune_closed_after_days == 0 {
            return None;
        }
        i64::try_from(self.prune_closed_after_days)
            .ok()
            .and_then(chrono::Duration::try_days)
    }
}

/// Parâmetros lidos uma única vez, na partida do processo.
///
/// O restante da configuração é relido a cada ciclo; mudar estes exige reiniciar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupSettings {
    pub rest_interval_secs: i64,
    pub cycle_timeout: Option<Duration>,
    pub state_path: Option<PathBuf>,
}

impl Default for StartupSettings {
    fn default() -> Self {
        Self {
            rest_interval_secs: default_rest_interval_secs(),
            cycle_timeout: Some(Duration::from_secs(default_cycle_timeout_secs())),
            state_path: default_state_file(),
        }
    }
}

impl StartupSettings {
    pub fn from_config(config: &WatchConfig) -> Self {
        Self {
            rest_interval_secs: config.rest_interval_secs,
            cycle_timeout: config.cycle_timeout(),
            state_path: config.state_path().map(Path::to_path_buf),
        }
    }
}

/// Decide qual arquivo de configuração usar: flag da CLI, depois
/// `JOBWATCH_CONFIG`, depois o local convencional.
pub fn resolve_config_path(cli: Option<PathBuf>) -> PathBuf {
    resolve_config_path_with(cli, std::env::var(CONFIG_PATH_ENV).ok())
}

fn resolve_config_path_with(cli: Option<PathBuf>, env: Option<String>) -> PathBuf {
    cli.or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
