// src/graph/scheduler.rs
//
// Moves compiled plans onto the audio thread and old plans back off it.

use super::context::RenderContext;
use super::plan::{BlockStats, ExecutionPlan};
use crate::audio_buffer::SampleBuffer;
use crate::handoff::{handoff, HandoffReceiver, HandoffSender};

/// Create the two ends of the plan channel.
///
/// `capacity` bounds both the submit queue and the retirement queue.
pub fn channel(capacity: usize) -> (PlanSubmitter, GraphProcessor) {
    let (sender, receiver) = handoff(capacity);
    (
        PlanSubmitter { sender },
        GraphProcessor {
            receiver,
            active: None,
            stats: ProcessorStats::default(),
        },
    )
}

//
// ===============================
// MARK: Control thread
// ===============================
//

/// Control-thread end: submits plans and drops retired ones.
///
/// This struct is NOT real-time safe.
pub struct PlanSubmitter {
    sender: HandoffSender<ExecutionPlan>,
}

impl PlanSubmitter {
    /// Queue a plan for the audio thread. A full queue hands the plan back.
    pub fn submit_plan(&mut self, plan: ExecutionPlan) -> Result<(), ExecutionPlan> {
        self.sender.send(plan).inspect_err(|_| {
            log::warn!("Plan queue is full; plan was not submitted");
        })
    }

    /// Drop every plan the audio thread has retired. Returns how many.
    pub fn reclaim(&mut self) -> usize {
        let mut reclaimed = 0;
        while let Some(plan) = self.sender.next_returned() {
            drop(plan);
            reclaimed += 1;
        }
        if reclaimed > 0 {
            log::debug!("Reclaimed {} execution plans", reclaimed);
        }
        reclaimed
    }
}

//
// ===============================
// MARK: Audio thread
// ===============================
//

/// Running totals kept by the [`GraphProcessor`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ProcessorStats {
    pub plans_adopted: u64,
    /// Blocks in which a waiting plan could not be adopted because the
    /// retirement queue was full.
    pub deferred_adoptions: u64,
    pub lock_contentions: u64,
    pub dropped_events: u64,
}

/// Audio-thread end: owns and runs the active plan.
///
/// Real-time safe: no allocation, no locks, no frees.
pub struct GraphProcessor {
    receiver: HandoffReceiver<ExecutionPlan>,
    active: Option<ExecutionPlan>,
    stats: ProcessorStats,
}

impl GraphProcessor {
    /// Adopt the newest submitted plan, then run one block.
    ///
    /// With no plan yet, this does nothing.
    pub fn process(&mut self, num_samples: usize, render: &RenderContext<'_>) -> BlockStats {
        let adoption = self.receiver.adopt(&mut self.active, 0);
        self.stats.plans_adopted += adoption.adopted as u64;
        if adoption.deferred {
            self.stats.deferred_adoptions += 1;
        }

        let Some(plan) = self.active.as_mut() else {
            return BlockStats::default();
        };

        let block = plan.process(num_samples, render);
        self.stats.lock_contentions += block.lock_contentions as u64;
        self.stats.dropped_events += block.dropped_events as u64;
        block
    }

    /// Master output of the last block, if the active plan has one.
    pub fn master_output(&self) -> Option<&SampleBuffer> {
        self.active.as_ref().and_then(ExecutionPlan::master_output)
    }

    #[inline]
    pub fn active_plan(&self) -> Option<&ExecutionPlan> {
        self.active.as_ref()
    }

    #[inline]
    pub fn stats(&self) -> ProcessorStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::graph::testing::{ConstantSource, Passthrough};
    use crate::graph::{compile, Topology};
    use crate::sequencer::{transport, SequenceMap, TransportConfig};

    fn constant_plan(value: f32) -> ExecutionPlan {
        let mut topology = Topology::new();
        let src = topology.add_node(Box::new(ConstantSource::new(value)));
        let out = topology.add_node(Box::new(Passthrough::new(1)));
        let src_out = topology.node(src).unwrap().audio_output(0).unwrap();
        let out_in = topology.node(out).unwrap().audio_input(0).unwrap();
        topology.connect(src_out, out_in).unwrap();
        topology.set_master_output(out).unwrap();

        let config = EngineConfig::default().with_max_block_size(32).with_arena_size(16 * 1024);
        compile(&topology, &config).unwrap()
    }

    fn run(processor: &mut GraphProcessor, num_samples: usize) -> BlockStats {
        let (_transport, rt_transport) = transport(TransportConfig::default());
        let sequences = SequenceMap::new();
        let render = RenderContext {
            sample_rate: 48_000.0,
            transport: &rt_transport,
            sequences: &sequences,
        };
        processor.process(num_samples, &render)
    }

    #[test]
    fn test_no_plan_is_silent() {
        let (_submitter, mut processor) = channel(4);
        assert_eq!(run(&mut processor, 16), BlockStats::default());
        assert!(processor.master_output().is_none());
    }

    #[test]
    fn test_newest_plan_wins_and_old_plans_come_back() {
        let (mut submitter, mut processor) = channel(4);

        submitter.submit_plan(constant_plan(0.1)).unwrap();
        submitter.submit_plan(constant_plan(0.2)).unwrap();
        run(&mut processor, 16);

        assert_eq!(processor.stats().plans_adopted, 2);
        assert_eq!(processor.master_output().unwrap().channel(0)[0], 0.2);
        assert_eq!(submitter.reclaim(), 1);
        assert_eq!(submitter.reclaim(), 0);
    }

    #[test]
    fn test_full_submit_queue_returns_plan() {
        let (mut submitter, _processor) = channel(1);
        submitter.submit_plan(constant_plan(0.1)).unwrap();
        assert!(submitter.submit_plan(constant_plan(0.2)).is_err());
    }

    #[test]
    fn test_adoption_waits_for_reclaim_when_retirement_is_full() {
        let (mut submitter, mut processor) = channel(1);

        submitter.submit_plan(constant_plan(0.1)).unwrap();
        run(&mut processor, 8);
        submitter.submit_plan(constant_plan(0.2)).unwrap();
        run(&mut processor, 8);
        // The first plan now fills the retirement queue
        submitter.submit_plan(constant_plan(0.3)).unwrap();
        run(&mut processor, 8);

        assert_eq!(processor.stats().deferred_adoptions, 1);
        assert_eq!(processor.master_output().unwrap().channel(0)[0], 0.2);

        submitter.reclaim();
        run(&mut processor, 8);
        assert_eq!(processor.master_output().unwrap().channel(0)[0], 0.3);
    }

    #[test]
    fn test_audio_thread_handoff() {
        let (mut submitter, mut processor) = channel(8);

        let audio = std::thread::spawn(move || {
            let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
            let mut last = 0.0;
            while std::time::Instant::now() < deadline {
                run(&mut processor, 32);
                if let Some(output) = processor.master_output() {
                    last = output.channel(0)[0];
                }
                if last == 0.5 {
                    break;
                }
                std::thread::yield_now();
            }
            last
        });

        for value in [0.1, 0.2, 0.3, 0.4, 0.5] {
            let mut plan = constant_plan(value);
            loop {
                submitter.reclaim();
                match submitter.submit_plan(plan) {
                    Ok(()) => break,
                    Err(returned) => plan = returned,
                }
                std::thread::yield_now();
            }
        }

        assert_eq!(audio.join().unwrap(), 0.5);
        submitter.reclaim();
    }
}
