use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

mod cli;

use cli::{Args, Commands, OutputFormat};
use nodepool_advisor::agent::AgentOrchestrator;
use nodepool_advisor::catalog::InstanceCatalog;
use nodepool_advisor::cluster::{ClusterPort, FixtureClusterPort, K8sClusterPort};
use nodepool_advisor::config::EngineConfig;
use nodepool_advisor::learning::LearningStore;
use nodepool_advisor::pricing::{NoLiveSource, PricingResolver};
use nodepool_advisor::types::{Architecture, Mode, Node, NodePool, Pod, PodPhase, ResourceAmount};

fn demo_fixture() -> (Vec<Node>, Vec<Pod>, Vec<NodePool>) {
    let node_a = Node {
        name: "demo-node-a".to_string(),
        instance_type: "m5.2xlarge".to_string(),
        architecture: Architecture::Amd64,
        mode: Mode::OnDemand,
        node_pool_name: Some("default".to_string()),
        allocatable: ResourceAmount::new(8.0, 32.0),
        capacity: ResourceAmount::new(8.0, 32.0),
        creation_time: chrono::Utc::now(),
        zone: Some("us-east-1a".to_string()),
        labels: std::collections::HashMap::new(),
        taints: Vec::new(),
    };
    let node_b = Node {
        name: "demo-node-b".to_string(),
        ..node_a.clone()
    };

    let pod = Pod {
        namespace: "default".to_string(),
        name: "demo-workload-0".to_string(),
        node_name: Some("demo-node-a".to_string()),
        phase: PodPhase::Running,
        requests: ResourceAmount::new(3.0, 10.0),
    };
    let pod2 = Pod {
        namespace: "default".to_string(),
        name: "demo-workload-1".to_string(),
        node_name: Some("demo-node-b".to_string()),
        phase: PodPhase::Running,
        requests: ResourceAmount::new(2.0, 8.0),
    };

    let pool = NodePool {
        name: "default".to_string(),
        declared_instance_types: vec!["m5.2xlarge".to_string()],
        declared_capacity_types: vec![Mode::OnDemand],
        member_nodes: vec!["demo-node-a".to_string(), "demo-node-b".to_string()],
        taints: Vec::new(),
        labels: std::collections::HashMap::new(),
        min_nodes: None,
    };

    (vec![node_a, node_b], vec![pod, pod2], vec![pool])
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Recommend {
            config_file,
            engine_config,
            strategy,
            format,
            fixture,
        } => {
            run_recommend_command(config_file, engine_config, strategy, format, fixture).await?;
        }
    }

    Ok(())
}

async fn run_recommend_command(
    config_file: Option<String>,
    engine_config: Option<String>,
    strategy: Option<String>,
    format: OutputFormat,
    fixture: bool,
) -> Result<()> {
    println!("{}", "💰 nodepool-advisor - Cost Optimization Engine".bright_cyan().bold());
    println!("{}", "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━".bright_cyan());

    info!("Starting NodePool recommendation run");

    let mut config = match &engine_config {
        Some(path) => EngineConfig::from_yaml_file(path)?,
        None => EngineConfig::default(),
    };
    if let Some(strategy) = strategy {
        config.strategy_default = strategy;
    }

    println!("📋 {}", "Configuration:".bright_yellow().bold());
    println!("   Region: {}", config.region.bright_green());
    println!("   Default strategy: {}", config.strategy_default.bright_green());
    println!("   Headroom: cpu {:.0}% / mem {:.0}%", config.headroom_cpu * 100.0, config.headroom_mem * 100.0);
    println!();

    let cluster: Arc<dyn ClusterPort> = if fixture {
        println!("🧪 Using in-memory demonstration cluster");
        let (nodes, pods, pools) = demo_fixture();
        Arc::new(FixtureClusterPort::new(nodes, pods, pools))
    } else {
        print!("🔗 Connecting to cluster... ");
        match K8sClusterPort::new(config_file.as_deref()).await {
            Ok(client) => {
                println!("{}", "✅ Success".bright_green());
                Arc::new(client)
            }
            Err(e) => {
                println!("{}", "❌ Failed".bright_red());
                eprintln!("Error: {}", e);
                return Err(e.into());
            }
        }
    };

    let resolver = Arc::new(PricingResolver::new(
        Arc::new(NoLiveSource),
        config.price_cache_ttl(),
        config.region.clone(),
    ));
    let catalog = Arc::new(InstanceCatalog::new(resolver.clone(), config.catalog_cache_ttl()));
    let learning = Arc::new(LearningStore::load(&config.history_file).await);

    let orchestrator = AgentOrchestrator::new(cluster, resolver, catalog, learning, config);

    println!("🔍 Computing recommendations...");
    let cancel = CancellationToken::new();
    let (plans, warnings) = orchestrator.recommend(&cancel).await?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&plans)?);
        }
        OutputFormat::Text => {
            print_text_report(&plans, &warnings);
        }
    }

    Ok(())
}

fn print_text_report(plans: &[nodepool_advisor::types::OptimizationPlan], warnings: &[nodepool_advisor::types::EngineWarning]) {
    if plans.is_empty() {
        println!("{}", "No cost-saving reconfigurations found.".bright_yellow());
    }
    for plan in plans {
        println!();
        println!(
            "{} {}",
            "NodePool:".bright_white().bold(),
            plan.node_pool.bright_green()
        );
        println!("  strategy: {}  risk: {:?}  confidence: {:.2}", plan.strategy, plan.risk_level, plan.confidence);
        for rec in &plan.recommendations {
            println!("  {}", rec.rationale_text);
        }
        if plan.learned_from_history {
            println!("  {}", "(strategy chosen from learned history)".bright_blue());
        }
        for insight in &plan.learning_insights {
            println!("  insight: {insight}");
        }
    }

    if !warnings.is_empty() {
        println!();
        println!("{}", "Warnings:".bright_yellow().bold());
        for w in warnings {
            match &w.node_pool {
                Some(pool) => println!("  [{pool}] {}: {}", w.code, w.message),
                None => println!("  {}: {}", w.code, w.message),
            }
        }
    }
}
