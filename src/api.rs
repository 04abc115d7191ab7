// src/api.rs
// REST HANDLERS + IN-MEMORY JOB STORE

use std::sync::Arc;

use actix_web::{web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use focus_panel::{
    DemographicConstraints, DiscussionConfig, DiscussionMessage, DiscussionSimulator,
    DiscussionTranscript, FocusGroupError, Persona, PersonaGenerator, Phase, Reporter,
    TextGenerator,
};

use crate::AppState;

pub type JobStore = Arc<DashMap<String, JobStatus>>;

// 1. Request formats
#[derive(Debug, Deserialize)]
pub struct PersonaRequest {
    pub count: usize,
    pub seed: Option<u64>,
    pub concept: Option<String>,
    pub category: Option<String>,
    pub constraints: Option<DemographicConstraints>,
}

#[derive(Debug, Deserialize)]
pub struct SimulationRequest {
    pub product_concept: String,
    pub category: String,
    pub stimulus_material: Option<String>,
    pub num_personas: Option<usize>,
    pub phases: Option<Vec<Phase>>,
    pub questions_per_phase: Option<usize>,
    pub max_responses_per_question: Option<usize>,
    pub temperature: Option<f32>,
    pub seed: Option<u64>,
    #[serde(default)]
    pub auto_scale: bool,
    pub constraints: Option<DemographicConstraints>,
}

impl SimulationRequest {
    /// Builds (and thereby validates) the discussion config; unset fields take builder defaults.
    pub fn to_config(&self, default_seed: u64) -> Result<DiscussionConfig, FocusGroupError> {
        let mut builder = DiscussionConfig::builder(&self.product_concept, &self.category)
            .seed(self.seed.unwrap_or(default_seed))
            .auto_scale(self.auto_scale);
        if let Some(stimulus) = &self.stimulus_material {
            builder = builder.stimulus(stimulus);
        }
        if let Some(n) = self.num_personas {
            builder = builder.num_personas(n);
        }
        if let Some(phases) = &self.phases {
            builder = builder.phases(phases.clone());
        }
        if let Some(n) = self.questions_per_phase {
            builder = builder.questions_per_phase(n);
        }
        if let Some(n) = self.max_responses_per_question {
            builder = builder.max_responses_per_question(n);
        }
        if let Some(t) = self.temperature {
            builder = builder.temperature(t);
        }
        builder.build()
    }
}

#[derive(Deserialize)]
pub struct TranscriptQuery {
    pub format: Option<String>,
}

// 2. Response formats
#[derive(Serialize)]
pub struct JobCreatedResponse {
    pub job_id: String,
    pub status: JobState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Processing,
    Completed,
    Failed,
}

// 3. Job status
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub id: String,
    pub status: JobState,
    pub progress: f32,
    pub personas: Vec<Persona>,
    pub messages: Vec<DiscussionMessage>,
    pub error: Option<String>,
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip)]
    pub transcript: Option<DiscussionTranscript>,
}

impl JobStatus {
    fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: JobState::Processing,
            progress: 0.0,
            personas: Vec::new(),
            messages: Vec::new(),
            error: None,
            finished_at: None,
            transcript: None,
        }
    }
}

fn error_body(msg: impl std::fmt::Display) -> serde_json::Value {
    json!({ "error": msg.to_string() })
}

fn bad_request(err: &FocusGroupError) -> HttpResponse {
    HttpResponse::BadRequest().json(error_body(err))
}

// POST /api/personas
pub async fn generate_personas(data: web::Data<AppState>, req: web::Json<PersonaRequest>) -> impl Responder {
    let req = req.into_inner();
    if !(1..=focus_panel::focus_group::MAX_PERSONAS).contains(&req.count) {
        return HttpResponse::BadRequest().json(error_body(format!(
            "count must be between 1 and {}, got {}",
            focus_panel::focus_group::MAX_PERSONAS,
            req.count
        )));
    }
    if let Some(constraints) = &req.constraints {
        if let Err(e) = constraints.validate() {
            return bad_request(&e);
        }
    }

    let seed = req.seed.unwrap_or(data.config.default_seed);
    info!(count = req.count, seed, "API: Persona generation requested");
    let result = web::block(move || {
        PersonaGenerator::new(seed).generate(
            req.count,
            req.constraints.as_ref(),
            req.concept.as_deref(),
            req.category.as_deref(),
        )
    })
    .await;

    match result {
        Ok(Ok(personas)) => HttpResponse::Ok().json(personas),
        Ok(Err(e @ (FocusGroupError::Config(_) | FocusGroupError::UnsatisfiableConstraints(_)))) => bad_request(&e),
        Ok(Err(e)) => {
            error!("API: Persona generation failed: {}", e);
            HttpResponse::InternalServerError().json(error_body(e))
        }
        Err(e) => {
            error!("API: Persona worker failed: {}", e);
            HttpResponse::InternalServerError().json(error_body("persona worker failed"))
        }
    }
}

// POST /api/simulate
pub async fn start_simulation(data: web::Data<AppState>, req: web::Json<SimulationRequest>) -> impl Responder {
    let req = req.into_inner();
    let mut config = match req.to_config(data.config.default_seed) {
        Ok(config) => config,
        Err(e) => {
            warn!("API: Rejected simulation request: {}", e);
            return bad_request(&e);
        }
    };
    if let Some(constraints) = &req.constraints {
        if let Err(e) = constraints.validate() {
            return bad_request(&e);
        }
    }
    config.model = data.config.model.clone();

    let job_id = Uuid::new_v4().to_string();
    data.jobs.insert(job_id.clone(), JobStatus::new(&job_id));
    info!(job_id = %job_id, personas = config.num_personas, "API: Simulation job created");

    tokio::spawn(run_job(
        job_id.clone(),
        config,
        req.constraints,
        data.brain.clone(),
        data.jobs.clone(),
    ));

    HttpResponse::Accepted().json(JobCreatedResponse {
        job_id,
        status: JobState::Processing,
    })
}

/// Share of the run a job is credited with once its panel exists.
const PANEL_READY_PROGRESS: f32 = 0.1;

async fn run_job(
    job_id: String,
    config: DiscussionConfig,
    constraints: Option<DemographicConstraints>,
    brain: Arc<dyn TextGenerator>,
    jobs: JobStore,
) {
    // 1. Panel
    let (n, seed) = (config.num_personas, config.seed);
    let (concept, category) = (config.product_concept.clone(), config.category.clone());
    let generated = tokio::task::spawn_blocking(move || {
        PersonaGenerator::new(seed).generate(n, constraints.as_ref(), Some(&concept), Some(&category))
    })
    .await;
    let personas = match generated {
        Ok(Ok(personas)) => personas,
        Ok(Err(e)) => return fail_job(&jobs, &job_id, e.to_string()),
        Err(e) => return fail_job(&jobs, &job_id, format!("persona worker failed: {e}")),
    };
    if let Some(mut job) = jobs.get_mut(&job_id) {
        job.personas = personas.clone();
        job.progress = PANEL_READY_PROGRESS;
    }

    // 2. Discussion, streaming messages into the job as they land
    let questions = (config.phases.len() * config.questions_per_phase).max(1) as f32;
    let simulator = DiscussionSimulator::new(config, brain);
    let mut asked = 0usize;
    let observer_jobs = jobs.clone();
    let observer_id = job_id.clone();
    let result = simulator
        .run_with_observer(personas, move |message| {
            if !message.is_participant() && message.replied_to.is_none() {
                asked += 1;
            }
            if let Some(mut job) = observer_jobs.get_mut(&observer_id) {
                job.messages.push(message.clone());
                let share = (asked as f32 / questions).min(1.0);
                job.progress = PANEL_READY_PROGRESS + (0.95 - PANEL_READY_PROGRESS) * share;
            }
        })
        .await;

    // 3. Complete
    match result {
        Ok(transcript) => {
            if let Some(mut job) = jobs.get_mut(&job_id) {
                job.personas = transcript.personas.clone();
                job.messages = transcript.messages.clone();
                job.transcript = Some(transcript);
                job.status = JobState::Completed;
                job.progress = 1.0;
                job.finished_at = Some(Utc::now());
            }
            info!(job_id = %job_id, "API: Job finished");
        }
        Err(e) => fail_job(&jobs, &job_id, e.to_string()),
    }
}

fn fail_job(jobs: &JobStore, job_id: &str, reason: String) {
    error!(job_id = %job_id, "API: Job failed: {}", reason);
    if let Some(mut job) = jobs.get_mut(job_id) {
        job.status = JobState::Failed;
        job.error = Some(reason);
        job.finished_at = Some(Utc::now());
    }
}

/// Drops finished jobs that completed or failed more than `retention` ago. Running jobs stay.
pub fn evict_finished(jobs: &JobStore, retention: chrono::Duration, now: DateTime<Utc>) -> usize {
    let before = jobs.len();
    jobs.retain(|_, job| job.finished_at.map_or(true, |at| now - at <= retention));
    let evicted = before.saturating_sub(jobs.len());
    if evicted > 0 {
        info!(evicted, remaining = jobs.len(), "API: Evicted finished jobs");
    }
    evicted
}

// GET /api/status/{job_id}
pub async fn get_job_status(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let job_id = path.into_inner();
    match data.jobs.get(&job_id) {
        Some(job) => HttpResponse::Ok().json(job.clone()),
        None => HttpResponse::NotFound().json(error_body("Job not found")),
    }
}

/// The finished transcript, or the response explaining why there is none.
fn finished_transcript(data: &AppState, job_id: &str) -> Result<DiscussionTranscript, HttpResponse> {
    let job = data
        .jobs
        .get(job_id)
        .ok_or_else(|| HttpResponse::NotFound().json(error_body("Job not found")))?;
    match (&job.status, &job.transcript) {
        (JobState::Completed, Some(transcript)) => Ok(transcript.clone()),
        (JobState::Failed, _) => Err(HttpResponse::Conflict().json(error_body(format!(
            "job failed: {}",
            job.error.as_deref().unwrap_or("unknown error")
        )))),
        _ => Err(HttpResponse::Conflict().json(error_body("job is still running"))),
    }
}

// GET /api/transcript/{job_id}?format=markdown|json|csv
pub async fn get_transcript(
    data: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<TranscriptQuery>,
) -> impl Responder {
    let transcript = match finished_transcript(&data, &path.into_inner()) {
        Ok(t) => t,
        Err(resp) => return resp,
    };

    let format = query.format.as_deref().unwrap_or("json").to_ascii_lowercase();
    let rendered = match format.as_str() {
        "markdown" | "md" => Ok(("text/markdown; charset=utf-8", Reporter::to_markdown(&transcript))),
        "json" => Reporter::to_json(&transcript).map(|body| ("application/json", body)),
        "csv" => Reporter::to_csv(&transcript).map(|body| ("text/csv; charset=utf-8", body)),
        other => {
            return HttpResponse::BadRequest().json(error_body(format!(
                "unknown format '{other}', expected markdown, json or csv"
            )))
        }
    };

    match rendered {
        Ok((content_type, body)) => HttpResponse::Ok().content_type(content_type).body(body),
        Err(e) => {
            error!("API: Transcript rendering failed: {}", e);
            HttpResponse::InternalServerError().json(error_body(e))
        }
    }
}

// GET /api/stats/{job_id}
pub async fn get_stats(data: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match finished_transcript(&data, &path.into_inner()) {
        Ok(transcript) => {
            let stats = Reporter::summary_stats(&transcript);
            Reporter::log_summary(&stats);
            HttpResponse::Ok().json(stats)
        }
        Err(resp) => resp,
    }
}
