//! Framework de self-tests do kernel.
//!
//! Os testes rodam dentro do próprio kernel, depois de todos os inits e
//! antes da primeira task. Falha em qualquer teste derruba o boot: o
//! kernel só prossegue se a suíte inteira passar.

/// Resultado de um teste individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestResult {
    /// Teste passou.
    Pass,
    /// Teste falhou.
    Fail,
    /// Teste não se aplica neste contexto.
    Skip,
}

/// Um caso de teste.
pub struct TestCase {
    pub name: &'static str,
    pub func: fn() -> TestResult,
}

impl TestCase {
    pub const fn new(name: &'static str, func: fn() -> TestResult) -> Self {
        Self { name, func }
    }

    fn run(&self) -> TestResult {
        let result = (self.func)();
        match result {
            TestResult::Pass => crate::kinfo!(self.name),
            TestResult::Fail => crate::kerror!(self.name),
            TestResult::Skip => crate::kwarn!(self.name),
        }
        result
    }
}

/// Roda uma suíte inteira; panic na primeira falha.
pub fn run_test_suite(suite_name: &str, tests: &[TestCase]) {
    crate::kinfo!("========================================");
    crate::kinfo!(suite_name);
    crate::kinfo!("========================================");

    let mut passed = 0usize;
    let mut skipped = 0usize;

    for test in tests {
        match test.run() {
            TestResult::Pass => passed += 1,
            TestResult::Skip => skipped += 1,
            TestResult::Fail => {
                crate::kerror!("SUITE FALHOU:");
                crate::kerror!(suite_name);
                panic!("self-test failed");
            }
        }
    }

    crate::kinfo!("suite ok, passaram:", passed as u64);
    if skipped > 0 {
        crate::kinfo!("pulados:", skipped as u64);
    }
}

/// Asserção de teste: se a condição for falsa, loga e retorna Fail.
#[macro_export]
macro_rules! kassert {
    ($cond:expr) => {
        if !($cond) {
            $crate::kerror!("ASSERT FALHOU:");
            $crate::kerror!(stringify!($cond));
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
}

/// Asserção de igualdade.
#[macro_export]
macro_rules! kassert_eq {
    ($left:expr, $right:expr) => {
        if ($left) != ($right) {
            $crate::kerror!("ASSERT FALHOU: valores diferentes");
            $crate::kerror!("  esquerda =", ($left) as u64);
            $crate::kerror!("  direita  =", ($right) as u64);
            return $crate::klib::test_framework::TestResult::Fail;
        }
    };
}
