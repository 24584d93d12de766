use serde::Serialize;

use crate::active_message::selector::TcRun;
use crate::graph::cost::CostEstimate;
use crate::runtime::collectives::MinAvgMax;

/// One line of output per run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub iteration: usize,
    pub num_workers: usize,
    pub chunk_size: usize,
    pub triangles: i64,
    pub expected: Option<u64>,
    pub packets_sent: u64,
    pub packets_processed: u64,
    pub laptime: MinAvgMax,
}

impl RunReport {
    pub fn new(
        iteration: usize,
        num_workers: usize,
        chunk_size: usize,
        run: &TcRun,
        expected: Option<u64>,
    ) -> RunReport {
        RunReport {
            iteration,
            num_workers,
            chunk_size,
            triangles: run.triangles,
            expected,
            packets_sent: run.packets_sent,
            packets_processed: run.packets_processed,
            laptime: run.laptime,
        }
    }

    /// `false` only when a closed form count exists and disagrees.
    pub fn is_correct(&self) -> bool {
        self.expected.map_or(true, |e| e as i64 == self.triangles)
    }
}

pub fn print_graph(my_pe: usize, num_vertices: usize, num_edges: usize, cost: &CostEstimate) {
    if my_pe == 0 {
        println!("num_vertices: {num_vertices} num_edges: {num_edges}");
        println!("estimated pulls: {} pushes: {}", cost.pulls, cost.pushes);
    }
}

pub fn print_run(my_pe: usize, report: &RunReport, json: bool) {
    if my_pe != 0 {
        return;
    }
    let expected = match report.expected {
        Some(e) => format!("{e}"),
        None => "-".to_string(),
    };
    println!(
        "iteration: {} workers: {} chunk_size: {} triangles: {} expected: {expected} packets: {}",
        report.iteration,
        report.num_workers,
        report.chunk_size,
        report.triangles,
        report.packets_sent
    );
    println!(
        "laptime min: {:<6.6} avg: {:<6.6} max: {:<6.6}",
        report.laptime.min, report.laptime.avg, report.laptime.max
    );
    if json {
        match serde_json::to_string(report) {
            Ok(line) => println!("{line}"),
            Err(e) => eprintln!("could not serialize run: {e}"),
        }
    }
}
