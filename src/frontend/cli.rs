use crate::core::class::ClassRegistry;
use crate::errors::ProxyError;
use crate::frontend::config::ProxyConfig;
use crate::frontend::schema::Schema;
use crate::infrastructure::logging::{init_logging, LogConfig};
use crate::proxy::definition::{DefinitionSummary, ProxyKind};
use crate::proxy::factory::ProxyFactory;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

const ALL_KINDS: [ProxyKind; 4] = [
    ProxyKind::Ghost,
    ProxyKind::ValueHolder,
    ProxyKind::Interceptor,
    ProxyKind::ScopeLocalizer,
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the generated definitions for one class
    Describe { class: String, kinds: Vec<ProxyKind> },
    /// List the classes declared in the schema
    Classes,
    /// Print the effective configuration
    Config,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub command: Command,
    pub schema: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub json: bool,
    pub color: bool,
    pub verbose: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            command: Command::Classes,
            schema: None,
            config: None,
            json: false,
            color: true,
            verbose: false,
        }
    }
}

pub struct Cli {
    config: CliConfig,
}

impl Cli {
    pub fn new(config: CliConfig) -> Self {
        Self { config }
    }

    pub fn run(&self) -> Result<i32, String> {
        let proxy_config = self.load_config()?;

        let mut log_config = LogConfig::from_config(&proxy_config.logging);
        if self.config.verbose {
            log_config = log_config.with_level(tracing::Level::DEBUG);
        }
        let _guard = init_logging(log_config);

        match &self.config.command {
            Command::Config => {
                let rendered = if self.config.json {
                    serde_json::to_string_pretty(&proxy_config).map_err(|e| e.to_string())?
                } else {
                    proxy_config.to_toml().map_err(|e| e.to_string())?
                };
                println!("{}", rendered);
                Ok(0)
            }
            Command::Classes => {
                let registry = self.load_registry()?;
                let mut names = registry.class_names();
                names.sort();
                for name in names {
                    println!("{}", name);
                }
                Ok(0)
            }
            Command::Describe { class, kinds } => {
                let factory = ProxyFactory::with_config(self.load_registry()?, proxy_config);
                let kinds = if kinds.is_empty() { ALL_KINDS.to_vec() } else { kinds.clone() };

                let mut summaries = Vec::new();
                let mut failures = 0;
                for kind in kinds {
                    match factory.definition(kind, class) {
                        Ok(definition) => summaries.push(definition.summary()),
                        Err(e @ ProxyError::Shape { .. }) => {
                            failures += 1;
                            self.print_error(&format!("{}: {}", kind, e));
                        }
                        Err(e) => return Err(e.to_string()),
                    }
                }

                if self.config.json {
                    let rendered = serde_json::to_string_pretty(&summaries).map_err(|e| e.to_string())?;
                    println!("{}", rendered);
                } else {
                    for summary in &summaries {
                        self.print_summary(summary);
                    }
                }

                info!(class = %class, generated = summaries.len(), rejected = failures, "Described proxies");
                Ok(if failures == 0 { 0 } else { 1 })
            }
        }
    }

    fn load_config(&self) -> Result<ProxyConfig, String> {
        match &self.config.config {
            Some(path) => ProxyConfig::load(path).map_err(|e| e.to_string()),
            None => Ok(ProxyConfig::discover()),
        }
    }

    fn load_registry(&self) -> Result<Arc<ClassRegistry>, String> {
        let path = self
            .config
            .schema
            .as_ref()
            .ok_or_else(|| "No schema file specified".to_string())?;
        let registry = Schema::load(path)
            .and_then(Schema::into_registry)
            .map_err(|e| e.to_string())?;
        Ok(Arc::new(registry))
    }

    fn print_summary(&self, summary: &DefinitionSummary) {
        self.print_heading(&format!("{} ({})", summary.name, summary.kind));
        println!("  class:        {}", summary.class);
        println!("  public:       {}", summary.public.join(", "));
        for (name, declaring) in &summary.protected {
            println!("  protected:    {} (declared in {})", name, declaring);
        }
        for (name, declaring) in &summary.private {
            println!("  private:      {} (declared in {})", name, declaring.join(", "));
        }
        println!("  layout:       {}", summary.layout.join(", "));
        let constructors: Vec<String> = summary.constructors.iter().map(|c| format!("{:?}", c)).collect();
        println!("  constructors: {}", constructors.join(", "));
        println!("  routines:     {}", summary.access_routines.join(", "));
        for method in &summary.methods {
            let params: Vec<String> = method
                .params
                .iter()
                .map(|p| format!("{}${}", if p.by_ref { "&" } else { "" }, p.name))
                .collect();
            println!(
                "  method:       {}{}({}) from {}",
                if method.returns_ref { "&" } else { "" },
                method.name,
                params.join(", "),
                method.declaring_class
            );
        }
        println!();
    }

    fn print_error(&self, msg: &str) {
        if self.config.color {
            eprintln!("\x1b[31m{}\x1b[0m", msg);
        } else {
            eprintln!("{}", msg);
        }
    }

    fn print_heading(&self, msg: &str) {
        if self.config.color {
            println!("\x1b[1m{}\x1b[0m", msg);
        } else {
            println!("{}", msg);
        }
    }
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} <command> [OPTIONS]\n\nCommands:\n  \
         describe <schema> --class NAME   Show generated proxy definitions\n  \
         classes <schema>                 List declared classes\n  \
         config                           Show the effective configuration\n\nOptions:\n  \
         --kind KIND     ghost, value-holder, interceptor or scope-localizer (repeatable)\n  \
         --config FILE   Read configuration from FILE instead of .proxykit.toml\n  \
         --json          Print JSON\n  \
         --no-color      Disable colored output\n  \
         -v, --verbose   Debug logging",
        program
    )
}

pub fn parse_args() -> Result<CliConfig, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from(&args)
}

/// Parses a full argument vector, program name first
pub fn parse_args_from(args: &[String]) -> Result<CliConfig, String> {
    let program = args.first().map(String::as_str).unwrap_or("proxykit");
    if args.len() < 2 {
        return Err(usage(program));
    }

    let mut config = CliConfig::default();
    let mut class = None;
    let mut kinds = Vec::new();
    let mut positional = Vec::new();
    let mut i = 1;

    while i < args.len() {
        match args[i].as_str() {
            "--json" => config.json = true,
            "--no-color" => config.color = false,
            "-v" | "--verbose" => config.verbose = true,
            "-h" | "--help" => return Err(usage(program)),
            "--class" | "--kind" | "--config" => {
                let flag = args[i].as_str();
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| format!("{} requires an argument", flag))?;
                match flag {
                    "--class" => class = Some(value.clone()),
                    "--kind" => kinds.push(value.parse::<ProxyKind>().map_err(|e| e.to_string())?),
                    _ => config.config = Some(PathBuf::from(value)),
                }
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => positional.push(arg.to_string()),
        }
        i += 1;
    }

    let mut positional = positional.into_iter();
    let command = positional.next().ok_or_else(|| usage(program))?;
    config.schema = positional.next().map(PathBuf::from);
    if let Some(extra) = positional.next() {
        return Err(format!("Unexpected argument: {}", extra));
    }

    config.command = match command.as_str() {
        "describe" => {
            if config.schema.is_none() {
                return Err("describe requires a schema file".to_string());
            }
            let class = class.ok_or_else(|| "describe requires --class".to_string())?;
            Command::Describe { class, kinds }
        }
        "classes" => {
            if config.schema.is_none() {
                return Err("classes requires a schema file".to_string());
            }
            Command::Classes
        }
        "config" => Command::Config,
        other => return Err(format!("Unknown command: {}\n\n{}", other, usage(program))),
    };

    Ok(config)
}

/// Entry point for CLI binary
pub fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = parse_args()?;
    let cli = Cli::new(config);
    let exit_code = cli.run()?;
    std::process::exit(exit_code);
}
