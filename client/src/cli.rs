use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use common::config::env_string;
use common::engine;
use common::script::ScriptRegistry;
use common::{CreateTaskRequest, CreateTaskResponse, TaskInfo, TaskResults, WorkerMetrics};
use reqwest::Client;

/// Igual que en el worker:
/// - En Docker: MASTER_URL=http://master:8080
/// - Local: default http://localhost:8080
fn master_base_url() -> String {
    env_string("MASTER_URL", "http://localhost:8080")
}

#[derive(Parser, Debug)]
#[command(name = "client")]
#[command(about = "CLI simple para hablar con el master")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Envía un task de MapReduce
    Submit {
        /// Ruta de entrada en el file store (directorio, archivo, chunks o glob)
        #[arg(value_name = "INPUT")]
        input: String,
        /// Ruta del script en el file store
        #[arg(value_name = "SCRIPT")]
        script: String,
    },
    /// Consulta el estado de un task
    Status {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },
    /// Lista las rutas de resultado de un task
    Result {
        #[arg(value_name = "TASK_ID")]
        id: String,
    },

    Workers,

    /// Corre un programa localmente (map -> partition -> group -> reduce)
    Local {
        /// Programa registrado, ej: word_count
        #[arg(value_name = "PROGRAMA")]
        program: String,
        /// Archivo local de entrada
        #[arg(value_name = "ARCHIVO")]
        file: String,
        #[arg(long, default_value_t = 1)]
        reducers: u32,
    },
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let client = Client::new();
    let base_url = master_base_url();

    match cli.command {
        Commands::Submit { input, script } => {
            let url = format!("{}/api/v1/tasks", base_url);
            let resp = client
                .post(&url)
                .json(&CreateTaskRequest {
                    input: input.clone(),
                    script,
                })
                .send()
                .await?;

            match resp.status().as_u16() {
                404 => println!("Error: la entrada {} no existe en el file store", input),
                503 => println!("Error: no hay workers registrados"),
                _ => {
                    let created: CreateTaskResponse = resp.error_for_status()?.json().await?;
                    println!("Task creado:");
                    println!("  id: {}", created.task_id);
                }
            }
        }

        Commands::Status { id } => {
            let url = format!("{}/api/v1/tasks/{}", base_url, id);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let task: TaskInfo = resp.json().await?;
                println!("Task:");
                println!("  id: {}", task.id);
                println!("  estado: {:?}", task.status);
                println!("  input: {}", task.input);
                println!("  script: {}", task.script);
                println!("  regiones: {}", task.reduce_count);

                let total = task.chunks.len();
                let mapped = task.mapped_chunks();
                if total > 0 {
                    let pct = (mapped as f64 / total as f64) * 100.0;
                    println!("  chunks: {}/{} mapeados ({:.1}%)", mapped, total, pct);
                }
                for chunk in &task.chunks {
                    println!(
                        "    - {} [{:?}] worker={} intentos={}",
                        chunk.chunk_path,
                        chunk.status,
                        chunk.worker.as_deref().unwrap_or("-"),
                        chunk.attempts
                    );
                }
                if !task.pending_regions.is_empty() {
                    let pending: Vec<String> = task
                        .pending_regions
                        .iter()
                        .map(|r| format!("{}@{}", r.number, r.worker))
                        .collect();
                    println!("  regiones pendientes: {}", pending.join(", "));
                }

                println!("  submitted_at: {}", task.submitted_at);
                if let Some(ref done) = task.finished_at {
                    println!("  finalizado: {}", done);
                }
            } else {
                println!("Error: task no encontrado (status {})", resp.status());
            }
        }

        Commands::Result { id } => {
            let url = format!("{}/api/v1/tasks/{id}/result", base_url);
            let resp = client.get(&url).send().await?;

            if resp.status().is_success() {
                let results: TaskResults = resp.json().await?;
                println!("Resultados para task {} ({:?}):", results.task_id, results.status);
                if results.paths.is_empty() {
                    println!("  (todavía sin resultados)");
                } else {
                    for p in results.paths {
                        println!("    - {}", p);
                    }
                }
            } else {
                println!("No se encontraron resultados para task {id}");
            }
        }

        Commands::Local {
            program,
            file,
            reducers,
        } => {
            let registry = ScriptRegistry::with_builtin();
            let prog = registry.get(&program).ok_or_else(|| {
                anyhow!(
                    "programa desconocido '{}' (disponibles: {})",
                    program,
                    registry.names().join(", ")
                )
            })?;
            let input = std::fs::read_to_string(&file).with_context(|| format!("leyendo {}", file))?;

            let out = engine::run_local(prog, &input, reducers.max(1))?;
            for kv in out {
                println!("{}", serde_json::to_string(&kv)?);
            }
        }

        Commands::Workers => {
            let url = format!("{}/api/v1/workers", base_url);
            let resp = client.get(&url).send().await?;
            if resp.status().is_success() {
                let workers: Vec<WorkerMetrics> = resp.json().await?;
                if workers.is_empty() {
                    println!("No hay workers registrados.");
                } else {
                    for w in workers {
                        println!("Worker {}", w.worker_addr);
                        println!("  libre          : {}", w.free);
                        println!("  last_heartbeat : {} ms ago", w.last_heartbeat_ms_ago);
                        if let Some(cpu) = w.cpu_percent {
                            println!("  cpu_percent    : {:.1}%", cpu);
                        } else {
                            println!("  cpu_percent    : (sin datos)");
                        }
                        if let Some(mem) = w.mem_bytes {
                            println!("  mem_bytes      : {}", mem);
                        } else {
                            println!("  mem_bytes      : (sin datos)");
                        }
                        println!();
                    }
                }
            } else {
                println!(
                    "Error consultando /api/v1/workers (status {})",
                    resp.status()
                );
            }
        }
    }

    Ok(())
}
