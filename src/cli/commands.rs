//! Command dispatch

use std::env;
use std::io;

use clap::CommandFactory;
use tracing::{debug, instrument};

use crate::application::services::MaterializeWarning;
use crate::application::{ApplicationError, TreeEngine};
use crate::cli::args::{Cli, Commands, ConfigCommands};
use crate::cli::output;
use crate::cli::{CliError, CliResult};
use crate::config::{global_config_path, local_config_path, Settings};
use crate::domain::{
    EntityId, EntityKind, EntityRecord, EntityRef, HierarchySchema, NodeId, RootFilter, TreeArena,
};
use crate::infrastructure::di::ServiceContainer;

pub fn execute_command(cli: &Cli) -> CliResult<()> {
    match &cli.command {
        None => Err(CliError::Usage("no command given, see --help".into())),
        Some(Commands::Completion { shell }) => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(*shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Some(Commands::Config { command }) => config(cli, command),
        Some(Commands::Schema) => schema(cli),
        Some(Commands::Tree {
            depth,
            status,
            project_archived,
            operation_archived,
            orphans,
        }) => {
            let filter = RootFilter {
                work_order_status: *status,
                project_archived: *project_archived,
                operation_archived: *operation_archived,
            };
            tree(cli, &filter, *depth, *orphans)
        }
        Some(Commands::Branches { kind, id }) => branches(cli, *kind, *id),
        Some(Commands::Focus { kind, id }) => focus(cli, *kind, *id),
    }
}

fn load_settings(cli: &Cli) -> CliResult<Settings> {
    let dir = cli.dir.clone().or_else(|| env::current_dir().ok());
    let mut settings = Settings::load(dir.as_deref())?;
    if let Some(data) = &cli.data {
        settings.data_file = Some(data.clone());
    }
    debug!("settings: {:?}", settings);
    Ok(settings)
}

fn engine(cli: &Cli) -> CliResult<TreeEngine> {
    let container = ServiceContainer::new(load_settings(cli)?)?;
    Ok(container.engine()?)
}

fn lookup(engine: &mut TreeEngine, kind: EntityKind, id: EntityId) -> CliResult<EntityRecord> {
    let entity = EntityRef::new(kind, id);
    engine
        .find_entity(entity)?
        .ok_or_else(|| ApplicationError::StaleReference(entity).into())
}

fn report(warnings: &[MaterializeWarning]) {
    for warning in warnings {
        output::warning(warning);
    }
}

/// Expands `depth` levels below the roots.
fn expand_levels(engine: &mut TreeEngine, depth: usize) -> CliResult<Vec<MaterializeWarning>> {
    let mut frontier: Vec<NodeId> = engine.tree().roots().to_vec();
    let mut warnings = Vec::new();
    for _ in 0..depth {
        let mut next = Vec::new();
        for node in frontier {
            warnings.extend(engine.expand(node)?.warnings);
            next.extend_from_slice(engine.tree().children(node));
        }
        frontier = next;
    }
    Ok(warnings)
}

/// `root / child / node` labels from the top of the tree.
fn node_path(tree: &TreeArena, node: NodeId) -> String {
    let mut labels = Vec::new();
    let mut current = Some(node);
    while let Some(idx) = current {
        let Some(n) = tree.get(idx) else { break };
        labels.push(format!("{} {}", n.kind(), n.entity.display));
        current = n.parent();
    }
    labels.reverse();
    labels.join(" / ")
}

#[instrument(level = "debug", skip(cli))]
fn schema(cli: &Cli) -> CliResult<()> {
    let settings = load_settings(cli)?;
    let schema = HierarchySchema::resolve(settings.hierarchy);

    output::header(&schema);
    for (level, kind) in schema.levels().iter().enumerate() {
        output::detail(&format!("{level}: {kind}"));
    }
    let support = schema.filter_support();
    output::action(
        "filters",
        &format!(
            "work order status={} archived projects={} archived operations={}",
            support.work_order_status, support.project_archived, support.operation_archived
        ),
    );
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn tree(cli: &Cli, filter: &RootFilter, depth: Option<usize>, orphans: bool) -> CliResult<()> {
    let mut engine = engine(cli)?;
    let roots = engine.load_roots(filter)?;
    let depth = depth.unwrap_or_else(|| engine.schema().len().saturating_sub(1));
    let warnings = expand_levels(&mut engine, depth)?;

    let title = format!("{} ({} roots)", engine.schema(), roots);
    output::info(&engine.tree().to_termtree(&title));
    report(&warnings);

    if orphans {
        match engine.orphans() {
            Some(holder) => {
                output::header("orphans");
                for orphan in holder.entries() {
                    output::detail(&format!(
                        "{} {} [{}]",
                        orphan.kind,
                        orphan.display,
                        orphan.node_name()
                    ));
                }
            }
            None => output::warning("orphans are disabled (show_orphans = false)"),
        }
    }
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn branches(cli: &Cli, kind: EntityKind, id: EntityId) -> CliResult<()> {
    let mut engine = engine(cli)?;
    let entity = lookup(&mut engine, kind, id)?;
    let branches = engine.all_branches(&entity)?;

    output::header(&format!("{} {}", entity.kind, entity.display));
    for branch in &branches {
        output::detail(branch);
    }
    if branches.is_empty() {
        output::warning("no branches");
    }
    Ok(())
}

#[instrument(level = "debug", skip(cli))]
fn focus(cli: &Cli, kind: EntityKind, id: EntityId) -> CliResult<()> {
    let mut engine = engine(cli)?;
    let entity = lookup(&mut engine, kind, id)?;
    engine.load_roots(&RootFilter::default())?;
    let found = engine.focus_all_instances(&entity)?;

    if found == 0 {
        output::warning(&format!("{} not found in the tree", entity.entity_ref()));
        return Ok(());
    }
    if engine.selection().is_empty() {
        output::success(&format!(
            "{} found {} time(s) among the orphans",
            entity.entity_ref(),
            found
        ));
        return Ok(());
    }
    output::success(&format!("{} shown {} time(s)", entity.entity_ref(), found));
    for &node in engine.selection() {
        output::detail(&node_path(engine.tree(), node));
    }
    Ok(())
}

fn config(cli: &Cli, command: &ConfigCommands) -> CliResult<()> {
    match command {
        ConfigCommands::Show => {
            let settings = load_settings(cli)?;
            output::info(&settings.to_toml()?);
        }
        ConfigCommands::Template => output::info(&Settings::template()),
        ConfigCommands::Path => {
            match global_config_path() {
                Some(path) => output::action("global", &path.display()),
                None => output::warning("no home directory, global config disabled"),
            }
            let dir = cli.dir.clone().or_else(|| env::current_dir().ok());
            if let Some(dir) = dir {
                output::action("local", &local_config_path(&dir).display());
            }
        }
    }
    Ok(())
}
