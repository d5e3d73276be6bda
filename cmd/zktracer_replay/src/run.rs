use std::{
    fs::File,
    io::{BufReader, BufWriter, Write},
};

use eyre::{WrapErr, eyre};
use tracing::{debug, info};
use zktracer_hub::{Hub, InMemoryWorld, RuleSet, Tracer};

use crate::cli::Options;
use crate::events::Event;

pub fn replay(opts: &Options) -> eyre::Result<()> {
    let file = File::open(&opts.input)
        .wrap_err_with(|| format!("cannot open {}", opts.input.display()))?;
    let events: Vec<Event> = serde_json::from_reader(BufReader::new(file))
        .wrap_err("malformed event stream")?;
    info!(events = events.len(), fork = %opts.fork, "Replaying event stream");

    let mut hub = Hub::new(RuleSet::for_fork(opts.fork));
    let mut world = InMemoryWorld::new();
    for (index, event) in events.into_iter().enumerate() {
        let name = event.name();
        debug!(index, event = name, "Replaying event");
        apply(&mut hub, &mut world, event)
            .map_err(|err| eyre!("event {index} ({name}) failed: {err}"))?;
    }

    info!(lines = hub.line_count(), "Hub trace complete");
    for (module, lines) in hub.module_line_counts() {
        info!(%module, lines, "Satellite module");
    }

    if let Some(path) = &opts.rows {
        write_rows(&hub, path)?;
    }
    Ok(())
}

fn apply(
    hub: &mut Hub,
    world: &mut InMemoryWorld,
    event: Event,
) -> Result<(), zktracer_hub::HubError> {
    match event {
        Event::StartConflation { batch_size } => hub.start_conflation(batch_size),
        Event::StartBlock { header } => hub.start_block(&header),
        Event::StartTransaction { world: next, tx } => {
            *world = next;
            hub.start_transaction(world, &tx)
        }
        Event::ContextEnter { world: next, frame } => {
            refresh(world, next);
            hub.context_enter(world, &frame)
        }
        Event::PreOpcode { world: next, frame } => {
            refresh(world, next);
            hub.pre_opcode(world, &frame)
        }
        Event::PostExecution {
            world: next,
            frame,
            outcome,
        } => {
            refresh(world, next);
            hub.post_execution(world, &frame, outcome)
        }
        Event::ContextReEnter { world: next, frame } => {
            refresh(world, next);
            hub.context_re_enter(world, &frame)
        }
        Event::ContextExit { world: next, frame } => {
            refresh(world, next);
            hub.context_exit(world, &frame)
        }
        Event::EndTransaction {
            world: next,
            tx,
            outcome,
        } => {
            refresh(world, next);
            hub.end_transaction(world, &tx, &outcome)
        }
        Event::EndBlock { header, body } => hub.end_block(&header, &body),
        Event::EndConflation => hub.end_conflation(world),
    }
}

fn refresh(world: &mut InMemoryWorld, next: Option<InMemoryWorld>) {
    if let Some(next) = next {
        *world = next;
    }
}

fn write_rows(hub: &Hub, path: &std::path::Path) -> eyre::Result<()> {
    let file =
        File::create(path).wrap_err_with(|| format!("cannot create {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let mut failure = None;
    let rows = hub.commit(|row| {
        if failure.is_some() {
            return;
        }
        if let Err(err) = serde_json::to_writer(&mut writer, &row)
            .map_err(eyre::Report::from)
            .and_then(|()| writer.write_all(b"\n").map_err(eyre::Report::from))
        {
            failure = Some(err);
        }
    })?;
    if let Some(err) = failure {
        return Err(err);
    }
    writer.flush()?;
    info!(rows, path = %path.display(), "Wrote rows");
    Ok(())
}
