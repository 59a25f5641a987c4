use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::rc::Rc;

use super::{check_cothread, Lines};
use crate::stack::{round_stack_size, DefaultStack, SliceStack, StackUnit, STACK_ALIGNMENT};
use crate::{Config, Coroutine, Cothread, Side, Yielder};

fn config<T, F>(entry: F) -> Config<F, DefaultStack>
where
    F: FnOnce(&Yielder<T>, T) -> T + 'static,
{
    Config::new(entry).stack(DefaultStack::new(64 * 1024).unwrap())
}

struct SetOnDrop(Rc<Cell<bool>>);

impl Drop for SetOnDrop {
    fn drop(&mut self) {
        self.0.set(true);
    }
}

#[test]
fn smoke() {
    let hit = Rc::new(Cell::new(false));
    let hit2 = hit.clone();
    let mut coroutine = Coroutine::new(config(move |_, ()| {
        hit2.set(true);
    }));
    assert!(!hit.get());
    assert!(!coroutine.is_terminated());
    assert_eq!(Cothread::current(&coroutine), Side::Caller);
    coroutine.yield_with(());
    assert!(hit.get());
    assert!(coroutine.is_terminated());
}

#[test]
fn scenario_a() {
    let mut mem = vec![StackUnit::ZERO; StackUnit::count(round_stack_size(64 * 1024 + 1))];
    let stack = unsafe { SliceStack::new(&mut mem) };
    assert_eq!(stack.len() % STACK_ALIGNMENT, 0);

    let seen = Rc::new(RefCell::new(Vec::new()));
    let seen2 = seen.clone();
    let mut coroutine = Coroutine::new(Config::new(move |y: &Yielder<i32>, first: i32| {
        seen2.borrow_mut().push((y.current(), first));
        let second = y.yield_with(200);
        seen2.borrow_mut().push((y.current(), second));
        201
    })
    .stack(stack));

    assert_eq!(Cothread::current(&coroutine), Side::Caller);
    assert_eq!(coroutine.yield_with(100), 200);
    assert_eq!(Cothread::current(&coroutine), Side::Caller);
    assert_eq!(coroutine.yield_with(101), 201);
    assert_eq!(Cothread::current(&coroutine), Side::Caller);
    assert!(coroutine.is_terminated());
    assert_eq!(
        *seen.borrow(),
        [(Side::Callee, 100), (Side::Callee, 101)]
    );
}

#[test]
fn ping_pong() {
    let mut coroutine = Coroutine::new(config(|y: &Yielder<u64>, mut val| {
        for _ in 0..1000 {
            val = y.yield_with(val + 1);
        }
        val
    }));
    let mut val = 0;
    for i in 0..1000 {
        val = coroutine.yield_with(val);
        assert_eq!(val, 2 * i + 1);
        val += 1;
    }
    assert_eq!(coroutine.yield_with(12345), 12345);
    assert!(coroutine.is_terminated());
}

#[test]
fn zero_payload() {
    let mut coroutine = Coroutine::new(config(|y: &Yielder<usize>, first| {
        assert_eq!(first, 0);
        let second = y.yield_with(0);
        y.yield_with(second)
    }));
    assert_eq!(coroutine.yield_with(0), 0);
    assert_eq!(coroutine.yield_with(0), 0);
    assert_eq!(coroutine.yield_with(7), 7);
}

#[test]
fn large_payload() {
    let mut coroutine = Coroutine::new(config(|y: &Yielder<(String, [u64; 8])>, (s, arr)| {
        let (s2, arr2) = y.yield_with((s + " world", arr.map(|x| x * 2)));
        (s2.to_uppercase(), arr2)
    }));
    let (s, arr) = coroutine.yield_with(("hello".to_string(), [1; 8]));
    assert_eq!(s, "hello world");
    assert_eq!(arr, [2; 8]);
    let (s, arr) = coroutine.yield_with(("bye".to_string(), [3; 8]));
    assert_eq!(s, "BYE");
    assert_eq!(arr, [3; 8]);
}

#[test]
fn stateful() {
    #[repr(align(128))]
    struct Aligned(u8);
    let state = [41, 42, 43, 44, 45];
    let aligned = Aligned(100);
    let mut coroutine = Coroutine::new(config(move |y, _| {
        assert_eq!(&aligned as *const _ as usize % 128, 0);
        for i in state {
            y.yield_with(i);
        }
        aligned.0
    }));
    for i in state {
        assert_eq!(coroutine.yield_with(0), i);
    }
    assert_eq!(coroutine.yield_with(0), 100);
}

#[test]
#[should_panic = "attempt to yield into a terminated coroutine"]
fn yield_into_terminated() {
    let mut coroutine = Coroutine::new(config(|_, x: i32| x));
    assert_eq!(coroutine.yield_with(5), 5);
    coroutine.yield_with(6);
}

#[test]
fn nesting() {
    let mut outer = Coroutine::new(config(|y: &Yielder<i32>, mut val| {
        let mut inner = Coroutine::new(config(|y: &Yielder<i32>, mut val| {
            loop {
                val = y.yield_with(val * 10);
            }
        }));
        for _ in 0..3 {
            let nested = inner.yield_with(val);
            val = y.yield_with(nested + 1);
        }
        // `inner` is still suspended here and gets unwound on drop.
        -val
    }));
    assert_eq!(outer.yield_with(1), 11);
    assert_eq!(outer.yield_with(2), 21);
    assert_eq!(outer.yield_with(3), 31);
    assert_eq!(outer.yield_with(4), -4);
    assert!(outer.is_terminated());
}

#[test]
fn unwind_order() {
    struct Guard(&'static str, Rc<RefCell<Vec<&'static str>>>);
    impl Drop for Guard {
        fn drop(&mut self) {
            self.1.borrow_mut().push(self.0);
        }
    }

    let log = Rc::new(RefCell::new(Vec::new()));
    let log2 = log.clone();
    let mut coroutine = Coroutine::new(config(move |y: &Yielder<u32>, _| {
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _a = Guard("a", log2.clone());
            let _b = Guard("b", log2.clone());
            y.yield_with(1);
            let _c = Guard("c", log2.clone());
            panic!("raised inside the callee");
        }));
        assert!(result.is_err());
        log2.borrow_mut().push("caught");
        2
    }));

    assert_eq!(coroutine.yield_with(0), 1);
    assert!(log.borrow().is_empty());

    // The caller can raise and catch between yields without disturbing the
    // suspended callee.
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _d = Guard("d", log.clone());
        panic!("raised inside the caller");
    }));
    assert!(result.is_err());
    assert_eq!(*log.borrow(), ["d"]);
    assert_eq!(coroutine.current(), Side::Caller);
    log.borrow_mut().clear();

    assert_eq!(coroutine.yield_with(0), 2);
    assert_eq!(*log.borrow(), ["c", "b", "a", "caught"]);
}

#[test]
fn drop_suspended() {
    let a = Rc::new(Cell::new(false));
    let b = Rc::new(Cell::new(false));
    let a_drop = SetOnDrop(a.clone());
    let b_drop = SetOnDrop(b.clone());
    let mut coroutine = Coroutine::new(config(move |y, ()| {
        drop(a_drop);
        let _live = b_drop;
        y.yield_with(());
        unreachable!();
    }));
    coroutine.yield_with(());
    assert!(a.get());
    assert!(!b.get());
    drop(coroutine);
    assert!(b.get());
}

#[test]
fn drop_before_start() {
    let shared = Rc::new(());
    let shared2 = shared.clone();
    let coroutine = Coroutine::new(config(move |_, ()| {
        drop(shared2);
        unreachable!();
    }));
    assert_eq!(Rc::strong_count(&shared), 2);
    drop(coroutine);
    assert_eq!(Rc::strong_count(&shared), 1);
}

#[test]
fn force_unwind_and_reuse_stack() {
    let hit = Rc::new(Cell::new(false));
    let guard = SetOnDrop(hit.clone());
    let mut coroutine = Coroutine::new(config(move |y, ()| {
        let _guard = guard;
        loop {
            y.yield_with(());
        }
    }));
    coroutine.yield_with(());
    coroutine.yield_with(());
    coroutine.force_unwind();
    assert!(hit.get());
    assert!(coroutine.is_terminated());

    let stack = coroutine.into_stack();
    let mut coroutine = Coroutine::new(Config::new(|_: &Yielder<i32>, x: i32| x + 1).stack(stack));
    assert_eq!(coroutine.yield_with(1), 2);
}

#[test]
#[should_panic = "cannot extract stack from an incomplete coroutine"]
fn into_stack_incomplete() {
    let coroutine = Coroutine::new(config(|_, ()| ()));
    coroutine.into_stack();
}

#[test]
fn yield_from_different_depths() {
    fn descend(y: &Yielder<u32>, depth: u32, padding: &mut [u8; 256]) -> u32 {
        unsafe {
            ptr::read_volatile(&padding);
        }
        if depth == 0 {
            y.yield_with(0)
        } else {
            let got = y.yield_with(depth);
            got + descend(y, depth - 1, &mut [0; 256])
        }
    }

    let mut coroutine = Coroutine::new(config(|y: &Yielder<u32>, max| {
        let total = descend(y, max, &mut [0; 256]);
        // Yield again from a shallower frame than before.
        y.yield_with(total)
    }));
    let mut depth = coroutine.yield_with(10);
    let mut sent = 0;
    while depth != 0 {
        assert_eq!(depth, 10 - sent);
        sent += 1;
        depth = coroutine.yield_with(1);
    }
    // One from every yielding frame plus the innermost one.
    assert_eq!(coroutine.yield_with(1), sent + 1);
    assert_eq!(coroutine.yield_with(99), 99);
}

#[test]
fn backtrace_in_callee() {
    #[inline(never)] // try to get this to show up in backtraces
    fn look_for_me(y: &Yielder<()>) {
        let trace = backtrace::Backtrace::new();
        println!("{:?}", trace);
        assert!(trace
            .frames()
            .iter()
            .flat_map(|f| f.symbols())
            .filter_map(|s| Some(s.name()?.to_string()))
            .any(|s| s.contains("look_for_me")));
        y.yield_with(());
    }

    let mut coroutine = Coroutine::new(config(|y, ()| {
        look_for_me(y);
        look_for_me(y);
    }));
    coroutine.yield_with(());
    coroutine.yield_with(());
    coroutine.yield_with(());
    assert!(coroutine.is_terminated());
}

#[test]
fn debug_lines() {
    let lines = Lines::default();
    let mut coroutine = Coroutine::new(
        config(|y: &Yielder<u8>, x| y.yield_with(x))
            .caller_name("main")
            .callee_name("worker")
            .sink(lines.clone()),
    );
    assert_eq!(
        lines.take(),
        [
            "worker: initializing endpoint",
            "worker: initialized",
            "worker: saving endpoint",
            "worker: yielding",
            "main: resuming",
            "main: endpoint restored",
        ]
    );

    coroutine.yield_with(1);
    assert_eq!(
        lines.take(),
        [
            "main: saving endpoint",
            "main: yielding",
            "worker: resuming",
            "worker: endpoint restored",
            "worker: starting user callback",
            "worker: saving endpoint",
            "worker: yielding",
            "main: resuming",
            "main: endpoint restored",
        ]
    );

    coroutine.yield_with(2);
    let tail = lines.take();
    assert!(tail.contains(&"worker: user callback returned".to_string()));
    assert_eq!(tail[tail.len() - 2], "worker: complete, returning to main");
    assert_eq!(tail[tail.len() - 1], "main: endpoint restored");
}

#[test]
fn shared_interface() {
    let coroutine = Coroutine::new(config(|_, ()| ()).caller_name("main"));
    check_cothread(&coroutine, "main", crate::DEFAULT_CALLEE_NAME);
}

#[test]
fn user_data_visible_to_callee() {
    let mut ctr: usize = 1234;
    let ctr_ptr = &mut ctr as *mut usize;
    let mut coroutine = Coroutine::new(config(|y: &Yielder<()>, ()| {
        let ctr = y.user_data() as *mut usize;
        unsafe { *ctr += 1 };
        y.yield_with(());
        unsafe { *ctr += 1 };
    }));
    coroutine.set_user_data(ctr_ptr as *mut ());
    assert_eq!(unsafe { *ctr_ptr }, 1234);
    coroutine.yield_with(());
    assert_eq!(unsafe { *ctr_ptr }, 1235);
    unsafe { *ctr_ptr += 1 };
    coroutine.yield_with(());
    assert_eq!(unsafe { *ctr_ptr }, 1237);
}
