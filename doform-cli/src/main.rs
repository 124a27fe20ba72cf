mod desired;
mod state;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use log::warn;

use doform_core::codec::{json_to_value, value_to_json};
use doform_core::datalist::DataListConfig;
use doform_core::differ::create_plan;
use doform_core::effect::Effect;
use doform_core::interpreter::{EffectOutcome, Interpreter, InterpreterConfig};
use doform_core::plan::Plan;
use doform_core::provider::Provider;
use doform_core::resource::{Attributes, Resource, ResourceId, State, Value};
use doform_core::schema::ResourceSchema;
use doform_provider_digitalocean::lifecycle::{DataSource, ResourceLifecycle};
use doform_provider_digitalocean::{DigitalOceanProvider, data_sources, resources};

use crate::desired::Desired;
use crate::state::{DEFAULT_STATE_PATH, StateFile};

#[derive(Parser)]
#[command(name = "doform")]
#[command(about = "Declarative DigitalOcean infrastructure", long_about = None)]
struct Cli {
    /// Path to the local state file
    #[arg(long, global = true, default_value = DEFAULT_STATE_PATH)]
    state: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate the desired-state file
    Validate {
        /// Path to the desired-state JSON file
        #[arg(default_value = "doform.json")]
        file: PathBuf,
    },
    /// Show execution plan without applying changes
    Plan {
        /// Path to the desired-state JSON file
        #[arg(default_value = "doform.json")]
        file: PathBuf,
    },
    /// Apply changes to reach the desired state
    Apply {
        /// Path to the desired-state JSON file
        #[arg(default_value = "doform.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Destroy every resource recorded in the state file
    Destroy {
        /// Path to the desired-state JSON file (provider settings and ordering)
        #[arg(default_value = "doform.json")]
        file: PathBuf,

        /// Skip confirmation prompt (auto-approve)
        #[arg(long)]
        auto_approve: bool,
    },
    /// Adopt an existing upstream object into the state file
    Import {
        /// Resource type (e.g., digitalocean_record)
        resource_type: String,
        /// Local name of the resource
        name: String,
        /// Upstream import ID (e.g., example.com,3352896)
        import_id: String,

        /// Desired-state file holding provider settings
        #[arg(long, default_value = "doform.json")]
        file: PathBuf,
    },
    /// Evaluate a data source and print its records as JSON
    Query {
        /// Data source type (e.g., digitalocean_droplets)
        resource_type: String,

        /// Filter as KEY=VALUE[,VALUE...]; repeatable
        #[arg(long = "filter", value_name = "KEY=VALUES")]
        filters: Vec<String>,

        /// Sort as KEY or KEY:desc; repeatable
        #[arg(long = "sort", value_name = "KEY[:DIR]")]
        sorts: Vec<String>,

        /// Extra query field as KEY=VALUE (e.g., domain=example.com); repeatable
        #[arg(long = "set", value_name = "KEY=VALUE")]
        sets: Vec<String>,

        /// Desired-state file holding provider settings
        #[arg(long, default_value = "doform.json")]
        file: PathBuf,
    },
    /// List supported resource types and data sources
    Types,
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    let state_path = cli.state;

    let result = match cli.command {
        Commands::Validate { file } => run_validate(&file),
        Commands::Plan { file } => run_plan(&file, &state_path).await,
        Commands::Apply { file, auto_approve } => run_apply(&file, &state_path, auto_approve).await,
        Commands::Destroy { file, auto_approve } => {
            run_destroy(&file, &state_path, auto_approve).await
        }
        Commands::Import {
            resource_type,
            name,
            import_id,
            file,
        } => run_import(&file, &state_path, ResourceId::new(resource_type, name), &import_id).await,
        Commands::Query {
            resource_type,
            filters,
            sorts,
            sets,
            file,
        } => run_query(&file, &resource_type, &filters, &sorts, &sets).await,
        Commands::Types => {
            run_types();
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

// =============================================================================
// Schemas and validation
// =============================================================================

fn get_schemas() -> HashMap<String, ResourceSchema> {
    resources::all()
        .into_iter()
        .map(|r| (r.name().to_string(), r.schema()))
        .collect()
}

fn get_data_source_configs() -> HashMap<String, DataListConfig> {
    data_sources::all()
        .into_iter()
        .map(|d| {
            let config = d.config();
            (config.resource_type.clone(), config)
        })
        .collect()
}

fn validate_resources(resources: &[Resource]) -> Result<(), String> {
    let schemas = get_schemas();
    let configs = get_data_source_configs();
    let mut all_errors = Vec::new();

    for resource in resources {
        let id = &resource.id;
        if resource.is_data_source() {
            let Some(config) = configs.get(&id.resource_type) else {
                all_errors.push(format!("{}: unknown data source", id));
                continue;
            };
            if let Err(errors) = config.schema().validate(&resource.attributes) {
                all_errors.extend(errors.iter().map(|e| format!("{}: {}", id, e)));
            } else if let Err(e) = config.parse_query(&resource.attributes) {
                all_errors.push(format!("{}: {}", id, e));
            }
            continue;
        }

        let Some(schema) = schemas.get(&id.resource_type) else {
            all_errors.push(format!("{}: unknown resource type", id));
            continue;
        };
        if let Err(errors) = schema.validate(&resource.attributes) {
            all_errors.extend(errors.iter().map(|e| format!("{}: {}", id, e)));
        }
    }

    if all_errors.is_empty() {
        Ok(())
    } else {
        Err(all_errors.join("\n"))
    }
}

fn run_validate(file: &Path) -> Result<(), String> {
    let desired = Desired::load(file)?;

    println!("{}", "Validating...".cyan());

    validate_resources(&desired.resources)?;

    println!(
        "{}",
        format!(
            "✓ {} resources validated successfully.",
            desired.resources.len()
        )
        .green()
        .bold()
    );

    for resource in &desired.resources {
        let prefix = if resource.is_data_source() { "data." } else { "" };
        println!("  • {}{}", prefix, resource.id);
    }

    Ok(())
}

fn run_types() {
    println!("{}", "Resources:".cyan().bold());
    let mut names: Vec<String> = get_schemas().into_keys().collect();
    names.sort();
    for name in names {
        println!("  {}", name);
    }

    println!();
    println!("{}", "Data sources:".cyan().bold());
    let mut configs: Vec<DataListConfig> = get_data_source_configs().into_values().collect();
    configs.sort_by(|a, b| a.resource_type.cmp(&b.resource_type));
    for config in configs {
        println!(
            "  {} (filter: {})",
            config.resource_type,
            config.filter_keys.join(", ")
        );
    }
}

// =============================================================================
// Provider and refresh
// =============================================================================

/// Provider settings from the desired-state file when present, else the environment alone
fn provider_settings(file: &Path) -> Result<Attributes, String> {
    if file.exists() {
        Ok(Desired::load(file)?.provider)
    } else {
        Ok(Attributes::new())
    }
}

fn get_provider(settings: &Attributes) -> Result<DigitalOceanProvider, String> {
    let provider = DigitalOceanProvider::from_attributes(settings)
        .map_err(|e| format!("Provider configuration error: {}", e))?;

    // Ctrl-C aborts pending waits instead of killing the process mid-write
    let cancel = provider.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; cancelling pending operations");
            cancel.cancel();
        }
    });
    Ok(provider)
}

/// Read every stored resource upstream.
///
/// Attributes the upstream does not echo (secrets, user data) carry over from
/// the stored state. Resources gone upstream are dropped.
async fn refresh(
    provider: &DigitalOceanProvider,
    stored: &StateFile,
) -> Result<HashMap<ResourceId, State>, String> {
    let mut priors: Vec<State> = stored.states().into_values().collect();
    priors.sort_by_key(|s| s.id.to_string());

    let mut current = HashMap::new();
    for prior in priors {
        let state = provider
            .read(&prior.id, prior.identifier.as_deref())
            .await
            .map_err(|e| format!("Failed to refresh {}: {}", prior.id, e))?;
        if !state.exists {
            println!(
                "  {} {} no longer exists upstream",
                "!".yellow().bold(),
                prior.id
            );
        }
        current.insert(prior.id.clone(), state.carry_over(&prior));
    }
    Ok(current)
}

// =============================================================================
// Plan / Apply / Destroy
// =============================================================================

async fn prepare(
    file: &Path,
    state_path: &Path,
) -> Result<(Desired, DigitalOceanProvider, StateFile, Plan), String> {
    let desired = Desired::load(file)?;
    validate_resources(&desired.resources)?;

    let provider = get_provider(&desired.provider)?;
    let mut stored = StateFile::load(state_path)?;
    let current = refresh(&provider, &stored).await?;
    for state in current.values() {
        stored.record(state);
    }

    let plan = create_plan(&desired.resources, &current, &get_schemas());
    Ok((desired, provider, stored, plan))
}

async fn run_plan(file: &Path, state_path: &Path) -> Result<(), String> {
    let (_, _, _, plan) = prepare(file, state_path).await?;
    print_plan(&plan);
    Ok(())
}

async fn run_apply(file: &Path, state_path: &Path, auto_approve: bool) -> Result<(), String> {
    let (_, provider, mut stored, plan) = prepare(file, state_path).await?;

    if plan.is_empty() {
        stored.save()?;
        println!("{}", "No changes needed.".green());
        return Ok(());
    }

    print_plan(&plan);
    println!();

    if plan.mutation_count() > 0
        && !auto_approve
        && !confirm("Do you want to perform these actions?")?
    {
        println!("{}", "Apply cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Applying changes...".cyan().bold());
    println!();

    let interpreter = Interpreter::new(provider);
    let result = interpreter.apply(&plan).await;

    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(outcome) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                match outcome {
                    EffectOutcome::Read { state } => print_data_source(state)?,
                    EffectOutcome::Deleted { id } => stored.remove(id),
                    EffectOutcome::Skipped { reason } => println!("    skipped: {}", reason),
                    other => {
                        if let Some(state) = other.state() {
                            stored.record(state);
                        }
                    }
                }
            }
            Err(e) => {
                println!("  {} {} - {}", "✗".red(), format_effect(effect), e);
                record_partial_create(&mut stored, effect, e.identifier.as_deref());
            }
        }
    }

    stored.save()?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Apply complete! {} changes applied.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Apply failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

/// Keep the handle of an object whose create started but did not finish
fn record_partial_create(stored: &mut StateFile, effect: &Effect, identifier: Option<&str>) {
    let (Effect::Create(resource) | Effect::Replace { to: resource, .. }) = effect else {
        return;
    };
    if let Some(identifier) = identifier {
        warn!(
            "{} was created upstream as {} but did not finish; recording it for the next refresh",
            resource.id, identifier
        );
        let state = State::existing(resource.id.clone(), Attributes::new()).with_identifier(identifier);
        stored.record(&state);
    }
}

async fn run_destroy(file: &Path, state_path: &Path, auto_approve: bool) -> Result<(), String> {
    let settings = provider_settings(file)?;
    let declared: Vec<ResourceId> = if file.exists() {
        Desired::load(file)?.managed().map(|r| r.id.clone()).collect()
    } else {
        Vec::new()
    };

    let provider = get_provider(&settings)?;
    let mut stored = StateFile::load(state_path)?;
    let current = refresh(&provider, &stored).await?;

    let destroy_order = destroy_order(&declared, &current);
    if destroy_order.is_empty() {
        for id in current.keys() {
            stored.remove(id);
        }
        stored.save()?;
        println!("{}", "No resources to destroy.".green());
        return Ok(());
    }

    // Display destroy plan
    println!("{}", "Destroy Plan:".red().bold());
    println!();

    for (id, identifier) in &destroy_order {
        println!("  {} {} ({})", "-".red().bold(), id, identifier.dimmed());
    }

    println!();
    println!("Plan: {} to destroy.", destroy_order.len().to_string().red());
    println!();

    if !auto_approve && !confirm("Do you really want to destroy all resources?")? {
        println!("{}", "Destroy cancelled.".yellow());
        return Ok(());
    }

    println!("{}", "Destroying resources...".red().bold());
    println!();

    let mut plan = Plan::new();
    for (id, identifier) in destroy_order {
        plan.add(Effect::Delete { id, identifier });
    }
    let interpreter = Interpreter::new(provider).with_config(InterpreterConfig {
        dry_run: false,
        continue_on_error: true,
    });
    let result = interpreter.apply(&plan).await;

    for (effect, outcome) in plan.effects().iter().zip(&result.outcomes) {
        match outcome {
            Ok(_) => {
                println!("  {} {}", "✓".green(), format_effect(effect));
                stored.remove(effect.resource_id());
            }
            Err(e) => println!("  {} {} - {}", "✗".red(), format_effect(effect), e),
        }
    }
    for state in current.values().filter(|s| !s.exists) {
        stored.remove(&state.id);
    }
    stored.save()?;

    println!();
    if result.is_success() {
        println!(
            "{}",
            format!(
                "Destroy complete! {} resources destroyed.",
                result.success_count
            )
            .green()
            .bold()
        );
        Ok(())
    } else {
        Err(format!(
            "Destroy failed. {} succeeded, {} failed.",
            result.success_count, result.failure_count
        ))
    }
}

/// Existing resources in reverse declaration order; undeclared ones last, by name
fn destroy_order(
    declared: &[ResourceId],
    current: &HashMap<ResourceId, State>,
) -> Vec<(ResourceId, String)> {
    let handle = |id: &ResourceId| {
        current
            .get(id)
            .filter(|s| s.exists)
            .and_then(|s| s.identifier.clone())
    };

    let mut order: Vec<(ResourceId, String)> = declared
        .iter()
        .rev()
        .filter_map(|id| handle(id).map(|h| (id.clone(), h)))
        .collect();

    let mut rest: Vec<(ResourceId, String)> = current
        .keys()
        .filter(|id| !declared.contains(id))
        .filter_map(|id| handle(id).map(|h| (id.clone(), h)))
        .collect();
    rest.sort_by_key(|(id, _)| id.to_string());
    order.extend(rest);
    order
}

fn confirm(question: &str) -> Result<bool, String> {
    println!("{}", question.yellow().bold());
    println!(
        "  {}",
        "This action cannot be undone. Type 'yes' to confirm.".yellow()
    );
    print!("\n  Enter a value: ");
    std::io::Write::flush(&mut std::io::stdout()).map_err(|e| e.to_string())?;

    let mut input = String::new();
    std::io::stdin()
        .read_line(&mut input)
        .map_err(|e| e.to_string())?;
    println!();
    Ok(input.trim() == "yes")
}

// =============================================================================
// Import / Query
// =============================================================================

async fn run_import(
    file: &Path,
    state_path: &Path,
    id: ResourceId,
    import_id: &str,
) -> Result<(), String> {
    let mut stored = StateFile::load(state_path)?;
    if stored.get(&id).is_some() {
        return Err(format!("{} is already in the state file", id));
    }

    let provider = get_provider(&provider_settings(file)?)?;
    let state = provider
        .import(&id, import_id)
        .await
        .map_err(|e| e.to_string())?;
    if !state.exists {
        return Err(format!("{} was not found upstream", import_id));
    }

    stored.record(&state);
    stored.save()?;

    println!(
        "{}",
        format!(
            "✓ Imported {} ({}).",
            id,
            state.identifier.as_deref().unwrap_or(import_id)
        )
        .green()
        .bold()
    );
    let schema = get_schemas().remove(&id.resource_type);
    print_attributes(&state.attributes, schema.as_ref(), "    ");
    Ok(())
}

async fn run_query(
    file: &Path,
    resource_type: &str,
    filters: &[String],
    sorts: &[String],
    sets: &[String],
) -> Result<(), String> {
    let query = build_query(resource_type, filters, sorts, sets)?;
    validate_resources(std::slice::from_ref(&query))?;

    let provider = get_provider(&provider_settings(file)?)?;
    let state = provider
        .read_data_source(&query)
        .await
        .map_err(|e| e.to_string())?;

    let configs = get_data_source_configs();
    let result_attribute = configs
        .get(resource_type)
        .map(|c| c.result_attribute.as_str())
        .unwrap_or_default();
    let records = state
        .get(result_attribute)
        .map(value_to_json)
        .unwrap_or_else(|| serde_json::Value::Array(Vec::new()));
    let output = serde_json::to_string_pretty(&records).map_err(|e| e.to_string())?;
    println!("{}", output);
    Ok(())
}

/// Turn `--filter`, `--sort` and `--set` arguments into a data-source resource
fn build_query(
    resource_type: &str,
    filters: &[String],
    sorts: &[String],
    sets: &[String],
) -> Result<Resource, String> {
    let mut query = Resource::new(resource_type, "query").with_read_only(true);

    let mut filter_blocks = Vec::new();
    for filter in filters {
        let (key, values) = split_pair(filter, "--filter")?;
        let values = values.split(',').map(|v| Value::from(v.trim())).collect();
        filter_blocks.push(Value::Map(HashMap::from([
            ("key".to_string(), Value::from(key)),
            ("values".to_string(), Value::List(values)),
        ])));
    }
    if !filter_blocks.is_empty() {
        query.attributes.insert("filter".into(), Value::List(filter_blocks));
    }

    let mut sort_blocks = Vec::new();
    for sort in sorts {
        let (key, direction) = sort.split_once(':').unwrap_or((sort.as_str(), "asc"));
        sort_blocks.push(Value::Map(HashMap::from([
            ("key".to_string(), Value::from(key)),
            ("direction".to_string(), Value::from(direction)),
        ])));
    }
    if !sort_blocks.is_empty() {
        query.attributes.insert("sort".into(), Value::List(sort_blocks));
    }

    for set in sets {
        let (key, raw) = split_pair(set, "--set")?;
        // Numbers and booleans pass through typed; anything else is a string
        let value = serde_json::from_str::<serde_json::Value>(raw)
            .ok()
            .filter(|v| v.is_number() || v.is_boolean())
            .and_then(|v| json_to_value(&v))
            .unwrap_or_else(|| Value::from(raw));
        query.attributes.insert(key.to_string(), value);
    }

    Ok(query)
}

fn split_pair<'a>(arg: &'a str, flag: &str) -> Result<(&'a str, &'a str), String> {
    match arg.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key, value)),
        _ => Err(format!("{} expects KEY=VALUE, got '{}'", flag, arg)),
    }
}

// =============================================================================
// Output
// =============================================================================

fn print_plan(plan: &Plan) {
    if plan.is_empty() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    let schemas = get_schemas();

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let symbol = match effect {
            Effect::Create(_) => effect.symbol().green().bold(),
            Effect::Update { .. } => effect.symbol().yellow().bold(),
            Effect::Replace { .. } => effect.symbol().magenta().bold(),
            Effect::Delete { .. } => effect.symbol().red().bold(),
            Effect::Read { .. } | Effect::Import { .. } => effect.symbol().cyan(),
        };
        let id = effect.resource_id();
        let schema = schemas.get(&id.resource_type);

        match effect {
            Effect::Create(resource) => {
                println!("  {} {}", symbol, id);
                print_attributes(&resource.attributes, schema, "      ");
            }
            Effect::Update { from, to, changed, .. } => {
                println!("  {} {}", symbol, id);
                print_changes(from, to, changed, schema);
            }
            Effect::Replace { from, to, changed, .. } => {
                let reasons: Vec<&str> = changed
                    .iter()
                    .filter(|c| schema.and_then(|s| s.get(c)).is_some_and(|a| a.force_new))
                    .map(String::as_str)
                    .collect();
                println!(
                    "  {} {} {}",
                    symbol,
                    id,
                    format!("({} forces replacement)", reasons.join(", ")).dimmed()
                );
                print_changes(from, to, changed, schema);
            }
            Effect::Delete { identifier, .. } => {
                println!("  {} {} ({})", symbol, id, identifier.dimmed());
            }
            Effect::Read { .. } => println!("  {} data.{}", symbol, id),
            Effect::Import { import_id, .. } => println!("  {} {} ({})", symbol, id, import_id),
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to replace, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

fn print_changes(from: &State, to: &Resource, changed: &[String], schema: Option<&ResourceSchema>) {
    for key in changed {
        let old = from.get(key);
        let new = to.get(key);
        let (old, new) = if is_sensitive(schema, key) {
            ("(sensitive)".to_string(), "(sensitive)".to_string())
        } else {
            (
                old.map(format_value).unwrap_or_else(|| "(unset)".to_string()),
                new.map(format_value).unwrap_or_else(|| "(unset)".to_string()),
            )
        };
        println!("      {}: {} {} {}", key, old.red(), "→".dimmed(), new.green());
    }
}

fn print_attributes(attributes: &Attributes, schema: Option<&ResourceSchema>, indent: &str) {
    let mut keys: Vec<&String> = attributes.keys().collect();
    keys.sort();
    for key in keys {
        let value = if is_sensitive(schema, key) {
            "(sensitive)".to_string()
        } else {
            format_value(&attributes[key])
        };
        println!("{}{}: {}", indent, key, value);
    }
}

fn print_data_source(state: &State) -> Result<(), String> {
    let configs = get_data_source_configs();
    let Some(config) = configs.get(&state.id.resource_type) else {
        return Ok(());
    };
    let count = state
        .get(&config.result_attribute)
        .and_then(Value::elements)
        .map(|r| r.len())
        .unwrap_or(0);
    println!("    {} {}", count, config.result_attribute);
    Ok(())
}

fn is_sensitive(schema: Option<&ResourceSchema>, key: &str) -> bool {
    schema.and_then(|s| s.get(key)).is_some_and(|a| a.sensitive)
}

fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete { id, .. } => format!("Delete {}", id),
        Effect::Read { resource } => format!("Read data.{}", resource.id),
        Effect::Import { id, .. } => format!("Import {}", id),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Set(set) => {
            let strs: Vec<_> = set.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let strs: Vec<_> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_arguments_become_blocks() {
        let query = build_query(
            "digitalocean_droplets",
            &["region=nyc1,nyc3".to_string()],
            &["name:desc".to_string(), "memory".to_string()],
            &[],
        )
        .unwrap();
        assert!(query.is_data_source());

        let filters = query.get("filter").and_then(Value::elements).unwrap();
        let filter = filters[0].as_map().unwrap();
        assert_eq!(filter.get("key"), Some(&Value::from("region")));
        assert_eq!(
            filter.get("values").map(Value::string_elements),
            Some(vec!["nyc1".to_string(), "nyc3".to_string()])
        );

        let sorts = query.get("sort").and_then(Value::elements).unwrap();
        assert_eq!(sorts[0].as_map().unwrap().get("direction"), Some(&Value::from("desc")));
        assert_eq!(sorts[1].as_map().unwrap().get("direction"), Some(&Value::from("asc")));
    }

    #[test]
    fn set_arguments_keep_numbers_typed() {
        let query = build_query(
            "digitalocean_spaces_bucket_objects",
            &[],
            &[],
            &[
                "bucket=assets".to_string(),
                "max_keys=100".to_string(),
                "prefix=2024/".to_string(),
            ],
        )
        .unwrap();
        assert_eq!(query.get_string("bucket"), Some("assets"));
        assert_eq!(query.get_int("max_keys"), Some(100));
        assert_eq!(query.get_string("prefix"), Some("2024/"));
    }

    #[test]
    fn malformed_pair_is_rejected() {
        assert!(build_query("digitalocean_droplets", &["region".to_string()], &[], &[]).is_err());
    }

    #[test]
    fn validation_reports_unknown_types_and_missing_attributes() {
        let resources = vec![
            Resource::new("digitalocean_spaceship", "x"),
            Resource::new("digitalocean_tag", "web"),
            Resource::new("digitalocean_droplets", "all").with_read_only(true),
        ];
        let err = validate_resources(&resources).unwrap_err();
        assert!(err.contains("digitalocean_spaceship.x: unknown resource type"), "{err}");
        assert!(err.contains("digitalocean_tag.web"), "{err}");
        assert!(!err.contains("digitalocean_droplets.all"), "{err}");
    }

    #[test]
    fn destroy_runs_in_reverse_declaration_order() {
        let domain = ResourceId::new("digitalocean_domain", "example");
        let record = ResourceId::new("digitalocean_record", "www");
        let stray = ResourceId::new("digitalocean_tag", "old");
        let gone = ResourceId::new("digitalocean_tag", "gone");

        let current = HashMap::from([
            (domain.clone(), State::existing(domain.clone(), Attributes::new()).with_identifier("example.com")),
            (record.clone(), State::existing(record.clone(), Attributes::new()).with_identifier("example.com/1")),
            (stray.clone(), State::existing(stray.clone(), Attributes::new()).with_identifier("old")),
            (gone.clone(), State::not_found(gone.clone())),
        ]);
        let order = destroy_order(&[domain.clone(), record.clone()], &current);
        let ids: Vec<&ResourceId> = order.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![&record, &domain, &stray]);
    }

    #[test]
    fn partial_create_keeps_the_handle() {
        let dir = tempfile::tempdir().unwrap();
        let mut stored = StateFile::load(&dir.path().join("state.json")).unwrap();
        let resource = Resource::new("digitalocean_droplet", "web");

        record_partial_create(&mut stored, &Effect::Create(resource.clone()), Some("3164444"));
        let state = stored.get(&resource.id).unwrap();
        assert_eq!(state.identifier.as_deref(), Some("3164444"));

        let delete = Effect::Delete {
            id: ResourceId::new("digitalocean_tag", "old"),
            identifier: "old".to_string(),
        };
        record_partial_create(&mut stored, &delete, Some("old"));
        assert_eq!(stored.len(), 1);
    }
}
