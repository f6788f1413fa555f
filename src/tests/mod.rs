mod filtering_tests;
