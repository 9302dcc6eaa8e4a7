//! Producer -> bookkeeper -> workers refinement pipeline.
//!
//! - The producer walks the grid in diagonal order and loads each tile that
//!   takes part in a pair. With pixel memory management it first takes a
//!   permit from a semaphore sized `min(rows, cols) + 2 + workers`.
//! - The bookkeeper counts the pending pairs of every tile. A pair is handed
//!   to the workers once both of its tiles are loaded; a tile's pixels and
//!   permit are released when its last pair comes back.
//! - Workers run the pair search and report the result.
//!
//! When the producer is done and nothing is in flight the bookkeeper sends
//! one `Shutdown` per worker. Any error or panic stops the whole pipeline and
//! is returned once every thread has been joined.

use std::sync::Arc;
use std::time::Duration;

use common::{Buffer2, CancelToken};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};

use super::semaphore::Semaphore;
use super::{apply, mark_missing, plan, refine_pair, PairTask, RefineParams, RefineStats};
use crate::error::{Error, Result};
use crate::grid::{diagonal_order, CorrelationTriple, GridPos, TileGrid, TileReader};
use crate::outcome::Outcome;
use crate::progress::Progress;
use crate::worker::{join_guarded, spawn_guarded};

const POLL_INTERVAL: Duration = Duration::from_millis(20);

enum Event {
    Loaded {
        pos: GridPos,
        pixels: Arc<Buffer2<f32>>,
    },
    ProducerDone,
    PairDone {
        task: usize,
        translation: CorrelationTriple,
    },
}

enum Job {
    Pair {
        task: usize,
        pair: PairTask,
        neighbor: Arc<Buffer2<f32>>,
        tile: Arc<Buffer2<f32>>,
    },
    Shutdown,
}

/// Multi-threaded refiner with bounded pixel memory.
#[derive(Debug)]
pub struct PipelinedRefiner {
    params: RefineParams,
    workers: usize,
    manage_pixel_memory: bool,
    progress: Progress,
    cancel: CancelToken,
}

impl PipelinedRefiner {
    pub fn new(
        params: RefineParams,
        workers: usize,
        manage_pixel_memory: bool,
        progress: Progress,
        cancel: &CancelToken,
    ) -> Self {
        Self {
            params,
            workers: workers.max(1),
            manage_pixel_memory,
            progress,
            cancel: cancel.child(),
        }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Tiles allowed to hold pixels at once.
    pub fn permits(&self, rows: usize, cols: usize) -> usize {
        rows.min(cols) + 2 + self.workers
    }

    pub fn execute(
        &self,
        grid: &mut TileGrid,
        reader: &dyn TileReader,
    ) -> Result<Outcome<RefineStats>> {
        let (tasks, missing) = plan(grid, self.params.seed);
        mark_missing(grid, &missing);
        self.progress.advance(missing.len());
        let mut stats = RefineStats {
            refined: 0,
            missing: missing.len(),
        };
        if tasks.is_empty() {
            return Ok(Outcome::Completed(stats));
        }

        let layout = Layout::new(grid, &tasks);
        let semaphore = self
            .manage_pixel_memory
            .then(|| Semaphore::new(self.permits(grid.rows(), grid.cols())));
        tracing::info!(
            "Refining {} translations with {} workers{}",
            tasks.len(),
            self.workers,
            match &semaphore {
                Some(s) => format!(", at most {} tiles in memory", s.available()),
                None => String::new(),
            }
        );

        // Faults stop this run without touching the caller's token.
        let stop = self.cancel.child();
        let (mut results, fault) =
            self.run_threads(&tasks, &layout, semaphore.as_ref(), reader, &stop);
        results.sort_unstable_by_key(|&(task, _)| task);
        for (task, translation) in results {
            let pair = &tasks[task];
            apply(grid, pair.pos, pair.dir, translation);
            stats.refined += 1;
        }

        if let Some(err) = fault {
            return Err(err);
        }
        if self.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }
        Ok(Outcome::Completed(stats))
    }

    fn run_threads(
        &self,
        tasks: &[PairTask],
        layout: &Layout,
        semaphore: Option<&Semaphore>,
        reader: &dyn TileReader,
        stop: &CancelToken,
    ) -> (Vec<(usize, CorrelationTriple)>, Option<Error>) {
        let (event_tx, event_rx) = unbounded::<Event>();
        let (job_tx, job_rx) = unbounded::<Job>();

        std::thread::scope(|s| {
            let producer = {
                let events = event_tx.clone();
                spawn_guarded(s, "refine-producer".to_string(), stop, move || {
                    produce(&layout.load_order, reader, semaphore, &events, stop)
                })
            };

            let workers: Vec<_> = (0..self.workers)
                .map(|i| {
                    let name = format!("refine-worker-{i}");
                    let jobs = job_rx.clone();
                    let events = event_tx.clone();
                    let params = self.params;
                    let handle = spawn_guarded(s, name.clone(), stop, move || {
                        work(&jobs, &events, params, stop)
                    });
                    (name, handle)
                })
                .collect();
            drop(event_tx);
            drop(job_rx);

            let bookkeeper = spawn_guarded(s, "refine-bookkeeper".to_string(), stop, move || {
                let mut keeper = Bookkeeper::new(tasks, layout, semaphore, &self.progress);
                keeper.run(&event_rx, &job_tx, self.workers, stop);
                Ok(keeper.results)
            });

            let mut fault = None;
            let mut results = Vec::new();
            match join_guarded("refine-bookkeeper", bookkeeper) {
                Ok(r) => results = r,
                Err(err) => {
                    fault.get_or_insert(err);
                }
            }
            if let Err(err) = join_guarded("refine-producer", producer) {
                fault.get_or_insert(err);
            }
            for (name, handle) in workers {
                if let Err(err) = join_guarded(&name, handle) {
                    fault.get_or_insert(err);
                }
            }
            (results, fault)
        })
    }
}

/// Tile bookkeeping derived from the task list.
struct Layout {
    cols: usize,
    /// Task ids touching each tile, by row-major tile index.
    incident: Vec<Vec<usize>>,
    /// Tiles taking part in at least one task, diagonal order.
    load_order: Vec<GridPos>,
}

impl Layout {
    fn new(grid: &TileGrid, tasks: &[PairTask]) -> Self {
        let mut incident = vec![Vec::new(); grid.len()];
        for (id, task) in tasks.iter().enumerate() {
            incident[grid.index(task.pos)].push(id);
            incident[grid.index(task.neighbor)].push(id);
        }
        let load_order = diagonal_order(grid.rows(), grid.cols())
            .into_iter()
            .filter(|&pos| !incident[grid.index(pos)].is_empty())
            .collect();
        Self {
            cols: grid.cols(),
            incident,
            load_order,
        }
    }

    #[inline]
    fn index(&self, pos: GridPos) -> usize {
        pos.row * self.cols + pos.col
    }
}

fn produce(
    order: &[GridPos],
    reader: &dyn TileReader,
    semaphore: Option<&Semaphore>,
    events: &Sender<Event>,
    stop: &CancelToken,
) -> Result<()> {
    for &pos in order {
        if stop.is_cancelled() {
            return Ok(());
        }
        if let Some(sem) = semaphore {
            if !sem.acquire(stop) {
                return Ok(());
            }
        }
        let pixels = reader.read(pos)?;
        if events.send(Event::Loaded { pos, pixels }).is_err() {
            return Ok(());
        }
    }
    let _ = events.send(Event::ProducerDone);
    Ok(())
}

fn work(
    jobs: &Receiver<Job>,
    events: &Sender<Event>,
    params: RefineParams,
    stop: &CancelToken,
) -> Result<()> {
    while let Ok(job) = jobs.recv() {
        let Job::Pair {
            task,
            pair,
            neighbor,
            tile,
        } = job
        else {
            break;
        };
        if stop.is_cancelled() {
            continue;
        }
        let translation = refine_pair(
            &neighbor,
            &tile,
            &pair.initial,
            params.radius,
            params.method,
            pair.seed,
        );
        if events.send(Event::PairDone { task, translation }).is_err() {
            break;
        }
    }
    Ok(())
}

struct Bookkeeper<'a> {
    tasks: &'a [PairTask],
    layout: &'a Layout,
    semaphore: Option<&'a Semaphore>,
    progress: &'a Progress,
    pixels: Vec<Option<Arc<Buffer2<f32>>>>,
    remaining: Vec<usize>,
    in_flight: usize,
    results: Vec<(usize, CorrelationTriple)>,
}

impl<'a> Bookkeeper<'a> {
    fn new(
        tasks: &'a [PairTask],
        layout: &'a Layout,
        semaphore: Option<&'a Semaphore>,
        progress: &'a Progress,
    ) -> Self {
        Self {
            tasks,
            layout,
            semaphore,
            progress,
            pixels: vec![None; layout.incident.len()],
            remaining: layout.incident.iter().map(Vec::len).collect(),
            in_flight: 0,
            results: Vec::with_capacity(tasks.len()),
        }
    }

    fn run(
        &mut self,
        events: &Receiver<Event>,
        jobs: &Sender<Job>,
        workers: usize,
        stop: &CancelToken,
    ) {
        let mut producer_done = false;
        while !stop.is_cancelled() && !(producer_done && self.in_flight == 0) {
            let event = match events.recv_timeout(POLL_INTERVAL) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            };
            match event {
                Event::Loaded { pos, pixels } => {
                    if !self.on_loaded(pos, pixels, jobs) {
                        break;
                    }
                }
                Event::ProducerDone => producer_done = true,
                Event::PairDone { task, translation } => self.on_pair_done(task, translation),
            }
        }

        for _ in 0..workers {
            let _ = jobs.send(Job::Shutdown);
        }
        if let Some(sem) = self.semaphore {
            sem.close();
        }
        tracing::debug!(
            "Bookkeeper finished with {} of {} pairs",
            self.results.len(),
            self.tasks.len()
        );
    }

    /// Dispatches every pair whose other tile is already loaded.
    fn on_loaded(&mut self, pos: GridPos, pixels: Arc<Buffer2<f32>>, jobs: &Sender<Job>) -> bool {
        let index = self.layout.index(pos);
        self.pixels[index] = Some(pixels);

        for &task in &self.layout.incident[index] {
            let pair = self.tasks[task];
            let (Some(neighbor), Some(tile)) = (
                self.pixels[self.layout.index(pair.neighbor)].clone(),
                self.pixels[self.layout.index(pair.pos)].clone(),
            ) else {
                continue;
            };
            let job = Job::Pair {
                task,
                pair,
                neighbor,
                tile,
            };
            if jobs.send(job).is_err() {
                return false;
            }
            self.in_flight += 1;
        }
        true
    }

    fn on_pair_done(&mut self, task: usize, translation: CorrelationTriple) {
        self.in_flight -= 1;
        self.results.push((task, translation));
        self.progress.advance(1);

        let pair = self.tasks[task];
        for pos in [pair.pos, pair.neighbor] {
            let index = self.layout.index(pos);
            self.remaining[index] -= 1;
            if self.remaining[index] == 0 {
                self.pixels[index] = None;
                if let Some(sem) = self.semaphore {
                    sem.release();
                }
            }
        }
    }
}
