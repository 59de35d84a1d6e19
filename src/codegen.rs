//! Instrumentation text fragments.
//!
//! Every fragment is a pure function of its integer arguments and the
//! generator's settings; nothing here looks at the syntax tree. Fragments
//! carry their own trailing layout so they can be spliced directly in front
//! of (or behind) an existing statement.

use crate::config::ReportStream;

/// Default name of the inline timestamp reader.
pub const DEFAULT_TICK: &str = "tp_rdtsc";

/// Produces the C snippets for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    tick: String,
    stream: ReportStream,
}

impl Default for Generator {
    fn default() -> Self {
        Self::new(DEFAULT_TICK, ReportStream::Stderr)
    }
}

impl Generator {
    pub fn new(tick: impl Into<String>, stream: ReportStream) -> Self {
        Self {
            tick: tick.into(),
            stream,
        }
    }

    /// Header for a unit whose loops are instrumented: includes, the tick
    /// primitive, and `extern` declarations of the shared counter arrays.
    pub fn header(&self, loop_count: usize) -> String {
        let size = array_size(loop_count);
        format!(
            "#include <stdio.h>\n\
             #include <stdint.h>\n\
             \n\
             extern uint64_t loop_start[{size}];\n\
             extern uint64_t loop_total[{size}];\n\
             \n\
             {tick}\n",
            tick = self.tick_primitive(),
        )
    }

    /// Declarations placed in front of `main`: the whole-program counters and
    /// the definitions of both arrays.
    pub fn main_declarations(&self, loop_count: usize) -> String {
        let size = array_size(loop_count);
        format!(
            "#include <stdio.h>\n\
             #include <stdint.h>\n\
             \n\
             uint64_t start, total;\n\
             uint64_t loop_start[{size}];\n\
             uint64_t loop_total[{size}];\n\
             \n\
             {tick}\n",
            tick = self.tick_primitive(),
        )
    }

    /// First statement of `main`.
    pub fn main_prologue(&self) -> String {
        format!("start = {}();\n  ", self.tick)
    }

    pub fn loop_start(&self, id: usize) -> String {
        format!("loop_start[{id}] = {}();\n  ", self.tick)
    }

    pub fn loop_end(&self, id: usize) -> String {
        format!(
            "\n  loop_total[{id}] += {tick}() - loop_start[{id}];",
            tick = self.tick
        )
    }

    /// Runtime report printed before `main` returns.
    ///
    /// Percentages divide by `total` unguarded; a zero total prints a
    /// non-finite value.
    pub fn main_epilogue(&self, loop_count: usize) -> String {
        let stream = self.stream.as_c_name();
        format!(
            r#"{{
    uint64_t sum = 0;
    unsigned i;
    total = {tick}() - start;
    fprintf({stream}, "Total runtime: %llu\n", (unsigned long long)total);
    for (i = 0; i < {loop_count}u; ++i) {{
      fprintf({stream}, "Time for loop %u: %llu / %lf%%\n",
              i,
              (unsigned long long)loop_total[i],
              (double)loop_total[i] / total * 100);
      sum += loop_total[i];
    }}
    fprintf({stream}, "Unaccounted for runtime: %llu / %lf%%\n",
            (unsigned long long)(total - sum),
            (double)(total - sum) / total * 100);
  }}
  "#,
            tick = self.tick,
        )
    }

    fn tick_primitive(&self) -> String {
        format!(
            r#"#ifndef TINYPROF_TICK
#define TINYPROF_TICK
static inline uint64_t {tick}(void) {{
    unsigned int lo, hi;
    __asm__ __volatile__ ("rdtsc" : "=a" (lo), "=d" (hi));
    return ((uint64_t)hi << 32) | lo;
}}
#endif
"#,
            tick = self.tick
        )
    }
}

/// Zero-length arrays are not portable C; an empty run still gets one slot.
fn array_size(loop_count: usize) -> usize {
    loop_count.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_sizes_arrays_and_declares_tick() {
        let text = Generator::default().header(3);
        assert!(text.contains("extern uint64_t loop_start[3];"));
        assert!(text.contains("extern uint64_t loop_total[3];"));
        assert!(text.contains("static inline uint64_t tp_rdtsc(void)"));
        assert!(text.contains("#ifndef TINYPROF_TICK"));
        assert!(text.starts_with("#include <stdio.h>\n"));
    }

    #[test]
    fn main_declarations_define_counters() {
        let text = Generator::default().main_declarations(2);
        assert!(text.contains("uint64_t start, total;"));
        assert!(text.contains("uint64_t loop_start[2];"));
        assert!(text.contains("uint64_t loop_total[2];"));
        assert!(!text.contains("extern"));
    }

    #[test]
    fn empty_run_still_declares_one_slot() {
        let text = Generator::default().main_declarations(0);
        assert!(text.contains("uint64_t loop_start[1];"));
        let report = Generator::default().main_epilogue(0);
        assert!(report.contains("i < 0u"));
    }

    #[test]
    fn loop_timers_use_the_id() {
        let gen = Generator::new("tick", ReportStream::Stderr);
        assert_eq!(gen.loop_start(4), "loop_start[4] = tick();\n  ");
        assert_eq!(
            gen.loop_end(4),
            "\n  loop_total[4] += tick() - loop_start[4];"
        );
        assert_eq!(gen.main_prologue(), "start = tick();\n  ");
    }

    #[test]
    fn epilogue_reports_every_loop_and_remainder() {
        let report = Generator::default().main_epilogue(5);
        assert!(report.contains("total = tp_rdtsc() - start;"));
        assert!(report.contains("i < 5u"));
        assert!(report.contains("Total runtime: %llu\\n"));
        assert!(report.contains("(double)loop_total[i] / total * 100"));
        assert!(report.contains("Unaccounted for runtime"));
        assert!(report.contains("fprintf(stderr,"));
    }

    #[test]
    fn epilogue_honours_stream() {
        let report = Generator::new(DEFAULT_TICK, ReportStream::Stdout).main_epilogue(1);
        assert!(report.contains("fprintf(stdout,"));
        assert!(!report.contains("stderr"));
    }
}
