//! Testes da klib.

use crate::klib::bitmap::Bitmap;
use crate::klib::list::{IndexList, ListNode};
use crate::klib::test_framework::{run_test_suite, TestCase, TestResult};
use crate::{kassert, kassert_eq};

const KLIB_TESTS: &[TestCase] = &[
    TestCase::new("bitmap_set_get", test_bitmap_set_get),
    TestCase::new("bitmap_alloc_roundtrip", test_bitmap_alloc_roundtrip),
    TestCase::new("bitmap_lowest_run", test_bitmap_lowest_run),
    TestCase::new("list_fifo_order", test_list_fifo_order),
    TestCase::new("list_remove_middle", test_list_remove_middle),
    TestCase::new("align_helpers", test_align_helpers),
];

pub fn run_klib_tests() {
    run_test_suite("KLib", KLIB_TESTS);
}

fn test_bitmap_set_get() -> TestResult {
    let mut storage = [0u32; 4];
    let mut bitmap = Bitmap::new(&mut storage, 100);

    kassert!(!bitmap.get(0));
    bitmap.set(0, true);
    bitmap.set(99, true);
    kassert!(bitmap.get(0));
    kassert!(bitmap.get(99));
    kassert!(!bitmap.get(50));

    // Fora do range: sempre falso, set é ignorado
    bitmap.set(100, true);
    kassert!(!bitmap.get(100));

    TestResult::Pass
}

/// Alocar e liberar o mesmo número de bits devolve o bitmap ao estado
/// anterior.
fn test_bitmap_alloc_roundtrip() -> TestResult {
    let mut storage = [0u32; 4];
    let mut bitmap = Bitmap::new(&mut storage, 64);

    let first = bitmap.alloc_nbits(8);
    kassert_eq!(first.unwrap_or(999), 0);
    for i in 0..8 {
        kassert!(bitmap.get(i));
    }

    bitmap.set_range(0, 8, false);
    for i in 0..8 {
        kassert!(!bitmap.get(i));
    }

    let again = bitmap.alloc_nbits(8);
    kassert_eq!(again.unwrap_or(999), 0);

    TestResult::Pass
}

/// alloc_nbits devolve a MENOR sequência livre.
fn test_bitmap_lowest_run() -> TestResult {
    let mut storage = [0u32; 2];
    let mut bitmap = Bitmap::new(&mut storage, 64);

    bitmap.set(1, true);

    // A posição 0 está livre mas a sequência quebra na 1
    let run = bitmap.alloc_nbits(2);
    kassert_eq!(run.unwrap_or(999), 2);

    // Pedido maior que o bitmap não aloca nada
    kassert!(bitmap.alloc_nbits(65).is_none());

    TestResult::Pass
}

fn test_list_fifo_order() -> TestResult {
    let mut nodes = [ListNode::new(); 8];
    let mut list = IndexList::new();

    list.push_back(&mut nodes, 3);
    list.push_back(&mut nodes, 1);
    list.push_back(&mut nodes, 4);

    kassert_eq!(list.count(), 3);
    kassert_eq!(list.first().unwrap_or(999), 3);

    kassert_eq!(list.pop_front(&mut nodes).unwrap_or(999), 3);
    kassert_eq!(list.pop_front(&mut nodes).unwrap_or(999), 1);
    kassert_eq!(list.pop_front(&mut nodes).unwrap_or(999), 4);
    kassert!(list.is_empty());
    kassert!(list.pop_front(&mut nodes).is_none());

    TestResult::Pass
}

fn test_list_remove_middle() -> TestResult {
    let mut nodes = [ListNode::new(); 8];
    let mut list = IndexList::new();

    list.push_back(&mut nodes, 0);
    list.push_back(&mut nodes, 5);
    list.push_back(&mut nodes, 7);

    list.remove(&mut nodes, 5);
    kassert_eq!(list.count(), 2);

    // Iteração pela lista pula o removido
    let first = list.first().unwrap_or(999);
    kassert_eq!(first, 0);
    kassert_eq!(list.next(&nodes, first).unwrap_or(999), 7);

    TestResult::Pass
}

fn test_align_helpers() -> TestResult {
    kassert_eq!(crate::klib::align_up(10, 4), 12);
    kassert_eq!(crate::klib::align_up(12, 4), 12);
    kassert_eq!(crate::klib::align_down(10, 4), 8);
    kassert_eq!(crate::klib::align_down(0x1234, 0x1000), 0x1000);

    TestResult::Pass
}
