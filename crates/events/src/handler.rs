/// Decide and apply in one step, without persistence.
///
/// Runs `handle` and then `apply`s every returned event to the aggregate. Unit
/// tests and in-process calculations use this; the HTTP path goes through the
/// infra `CommandDispatcher`, which adds loading, appending and publishing.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: estateerp_core::Aggregate,
{
    let events = aggregate.handle(command)?;
    for ev in &events {
        aggregate.apply(ev);
    }
    Ok(events)
}
